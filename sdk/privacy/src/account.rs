//! Shielded account keys
//!
//! ```text
//! sk    (spending scalar)   = blake3("shroud-spending-key-v1", seed) mod r
//! owner (account key)       = H("ShroudPK", sk)
//! esk   (x25519 secret)     = blake3("shroud-encryption-key-v1", seed)
//! ```

use ark_bn254::Fr;
use ark_ff::PrimeField;
use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::commitment::Commitment;
use crate::crypto::{NoteCryptography, TrialDecryption};
use crate::encryption::{self, EncryptedNote};
use crate::error::{PrivacyError, Result};
use crate::field::FieldElement;
use crate::hash::HashFn;
use crate::note::Note;
use crate::nullifier::{Nullifier, NullifierKey};

const OWNER_DOMAIN: &[u8; 32] = b"ShroudPK\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0";

/// A wallet account: spending scalar plus note encryption key
pub struct Account<H> {
    nullifier_key: NullifierKey,
    owner: FieldElement,
    encryption_secret: StaticSecret,
    encryption_public: [u8; 32],
    hasher: H,
}

impl<H: HashFn> Account<H> {
    /// Deterministically derive every key from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32], hasher: H) -> Self {
        let spending = blake3::derive_key("shroud-spending-key-v1", seed);
        let encryption = blake3::derive_key("shroud-encryption-key-v1", seed);
        Self::from_parts(
            FieldElement::from_field(Fr::from_le_bytes_mod_order(&spending)),
            StaticSecret::from(encryption),
            hasher,
        )
    }

    /// Generate a random account
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R, hasher: H) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed, hasher)
    }

    fn from_parts(spending: FieldElement, encryption_secret: StaticSecret, hasher: H) -> Self {
        let owner = hasher.hash2(&FieldElement(*OWNER_DOMAIN).reduced(), &spending);
        let encryption_public = *PublicKey::from(&encryption_secret).as_bytes();
        Self {
            nullifier_key: NullifierKey::new(spending),
            owner,
            encryption_secret,
            encryption_public,
            hasher,
        }
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }
}

impl<H: HashFn> NoteCryptography for Account<H> {
    fn owner(&self) -> FieldElement {
        self.owner
    }

    fn encryption_public_key(&self) -> [u8; 32] {
        self.encryption_public
    }

    fn nullifier(&self, note: &Note) -> Result<Nullifier> {
        let index = note
            .leaf_index
            .ok_or_else(|| PrivacyError::validation("cannot nullify a note without a leaf index"))?;
        let commitment = note.commitment(&self.hasher)?;
        Ok(self
            .nullifier_key
            .derive_nullifier(&self.hasher, &commitment, index))
    }

    fn decrypt(
        &self,
        payload: &EncryptedNote,
        expected: &Commitment,
        leaf_index: u64,
    ) -> Result<TrialDecryption> {
        encryption::try_decrypt_note(
            payload,
            &self.encryption_secret,
            self.owner,
            expected,
            leaf_index,
            &self.hasher,
        )
    }

    fn encrypt(&self, note: &Note, recipient: &[u8; 32]) -> Result<EncryptedNote> {
        encryption::encrypt_note(note, recipient)
    }
}

impl<H> std::fmt::Debug for Account<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("owner", &self.owner)
            .field("encryption_public", &hex::encode(self.encryption_public))
            .finish_non_exhaustive()
    }
}
