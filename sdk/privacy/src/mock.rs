//! Deterministic stand-in for [`crate::Account`]
//!
//! Payloads are plaintext; the recipient key travels in the ephemeral key
//! slot and decides ownership. Nullifiers are a blake3 derivation over the
//! account tag, the commitment and the leaf index.

use ark_bn254::Fr;
use ark_ff::PrimeField;

use crate::commitment::Commitment;
use crate::crypto::{NoteCryptography, TrialDecryption};
use crate::encryption::{self, EncryptedNote};
use crate::error::{PrivacyError, Result};
use crate::field::FieldElement;
use crate::hash::{Blake3Hasher, HashFn};
use crate::note::Note;
use crate::nullifier::Nullifier;

#[derive(Debug, Clone)]
pub struct MockCryptography<H = Blake3Hasher> {
    tag: [u8; 32],
    owner: FieldElement,
    hasher: H,
}

impl MockCryptography<Blake3Hasher> {
    pub fn new(id: u64) -> Self {
        Self::with_hasher(id, Blake3Hasher)
    }
}

impl<H: HashFn> MockCryptography<H> {
    pub fn with_hasher(id: u64, hasher: H) -> Self {
        let tag = blake3::derive_key("shroud mock account v1", &id.to_le_bytes());
        let owner = FieldElement::from_field(Fr::from_le_bytes_mod_order(&tag));
        Self { tag, owner, hasher }
    }
}

impl<H: HashFn> NoteCryptography for MockCryptography<H> {
    fn owner(&self) -> FieldElement {
        self.owner
    }

    fn encryption_public_key(&self) -> [u8; 32] {
        self.tag
    }

    fn nullifier(&self, note: &Note) -> Result<Nullifier> {
        let index = note
            .leaf_index
            .ok_or_else(|| PrivacyError::validation("cannot nullify a note without a leaf index"))?;
        let commitment = note.commitment(&self.hasher)?;

        let mut hasher = blake3::Hasher::new_derive_key("shroud mock nullifier v1");
        hasher.update(&self.tag);
        hasher.update(commitment.as_bytes());
        hasher.update(&index.to_le_bytes());
        let digest = hasher.finalize();
        Ok(Nullifier::from_field(Fr::from_le_bytes_mod_order(
            digest.as_bytes(),
        )))
    }

    fn decrypt(
        &self,
        payload: &EncryptedNote,
        expected: &Commitment,
        leaf_index: u64,
    ) -> Result<TrialDecryption> {
        if payload.ephemeral_pk != self.tag {
            return Ok(TrialDecryption::NotMine);
        }
        let note = encryption::decode_plaintext(&payload.ciphertext, self.owner)?
            .with_leaf_index(leaf_index);
        encryption::check_commitment(note, expected, &self.hasher).map(TrialDecryption::Owned)
    }

    fn encrypt(&self, note: &Note, recipient: &[u8; 32]) -> Result<EncryptedNote> {
        Ok(EncryptedNote {
            ephemeral_pk: *recipient,
            nonce: [0u8; 12],
            ciphertext: encryption::encode_plaintext(note),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Amount;

    #[test]
    fn test_mock_ownership_by_tag() {
        let alice = MockCryptography::new(1);
        let bob = MockCryptography::new(2);
        let note = Note::native(Amount::from(5), alice.owner(), FieldElement::from_u64(3)).unwrap();
        let commitment = note.commitment(&Blake3Hasher).unwrap();

        let payload = bob.encrypt(&note, &alice.encryption_public_key()).unwrap();
        assert_eq!(
            alice.decrypt(&payload, &commitment, 0).unwrap(),
            TrialDecryption::Owned(note.with_leaf_index(0))
        );
        assert_eq!(
            bob.decrypt(&payload, &commitment, 0).unwrap(),
            TrialDecryption::NotMine
        );
    }

    #[test]
    fn test_mock_garbage_for_owner_is_malformed() {
        let alice = MockCryptography::new(1);
        let payload = EncryptedNote {
            ephemeral_pk: alice.encryption_public_key(),
            nonce: [0u8; 12],
            ciphertext: vec![1, 2, 3],
        };
        assert!(matches!(
            alice.decrypt(&payload, &Commitment::ZERO, 0),
            Err(PrivacyError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_mock_nullifier_is_per_account() {
        let alice = MockCryptography::new(1);
        let bob = MockCryptography::new(2);
        let note = Note::native(Amount::from(5), alice.owner(), FieldElement::ZERO)
            .unwrap()
            .with_leaf_index(4);

        assert_eq!(alice.nullifier(&note).unwrap(), alice.nullifier(&note).unwrap());
        assert_ne!(alice.nullifier(&note).unwrap(), bob.nullifier(&note).unwrap());
    }
}
