//! Note Encryption
//!
//! Encrypts note data for the recipient using ECDH + ChaCha20-Poly1305.
//!
//! ```text
//! Flow:
//! 1. Sender generates ephemeral keypair (epk, esk)
//! 2. Shared secret = ECDH(esk, recipient_pk)
//! 3. Encryption key = blake3_derive_key("shroud-note-v1", shared_secret || epk)
//! 4. Ciphertext = ChaCha20-Poly1305(key, nonce, plaintext)
//! 5. Output = epk (32) || nonce (12) || ciphertext + tag
//! ```
//!
//! The owner is not part of the plaintext: a payload that opens under an
//! account's key is rebuilt with that account as owner and must then
//! reproduce the leaf's commitment.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::commitment::Commitment;
use crate::crypto::TrialDecryption;
use crate::error::{PrivacyError, Result};
use crate::field::{Amount, AssetId, FieldElement};
use crate::hash::HashFn;
use crate::note::{MAX_NOTE_ASSETS, Note};

const NOTE_KEY_CONTEXT: &str = "shroud-note-v1";

/// An encrypted note (published next to its leaf)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNote {
    /// Ephemeral public key for ECDH
    #[serde(with = "hex::serde")]
    pub ephemeral_pk: [u8; 32],
    /// Nonce for ChaCha20-Poly1305
    #[serde(with = "hex::serde")]
    pub nonce: [u8; 12],
    /// Encrypted note data with authentication tag
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedNote {
    /// Size of the fixed header (epk + nonce)
    pub const HEADER: usize = 32 + 12;
    /// Size of encrypted note overhead (header + tag)
    pub const OVERHEAD: usize = Self::HEADER + 16;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER + self.ciphertext.len());
        bytes.extend_from_slice(&self.ephemeral_pk);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER {
            return Err(PrivacyError::MalformedPayload(format!(
                "payload is {} bytes, header alone needs {}",
                bytes.len(),
                Self::HEADER
            )));
        }
        let mut ephemeral_pk = [0u8; 32];
        ephemeral_pk.copy_from_slice(&bytes[..32]);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&bytes[32..Self::HEADER]);

        Ok(Self {
            ephemeral_pk,
            nonce,
            ciphertext: bytes[Self::HEADER..].to_vec(),
        })
    }
}

/// Encrypt a note for a recipient's X25519 public key
pub fn encrypt_note(note: &Note, recipient_pk: &[u8; 32]) -> Result<EncryptedNote> {
    let mut rng = rand::thread_rng();
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut rng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(&PublicKey::from(*recipient_pk));
    let key = derive_note_key(shared_secret.as_bytes(), ephemeral_pk.as_bytes());

    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), encode_plaintext(note).as_slice())
        .map_err(|e| PrivacyError::Encryption(e.to_string()))?;

    Ok(EncryptedNote {
        ephemeral_pk: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open the AEAD envelope, `None` when the payload was not sealed to `secret`
pub fn open_note(encrypted: &EncryptedNote, secret: &StaticSecret) -> Option<Vec<u8>> {
    let shared_secret = secret.diffie_hellman(&PublicKey::from(encrypted.ephemeral_pk));
    let key = derive_note_key(shared_secret.as_bytes(), &encrypted.ephemeral_pk);

    ChaCha20Poly1305::new(Key::from_slice(&key))
        .decrypt(
            Nonce::from_slice(&encrypted.nonce),
            encrypted.ciphertext.as_slice(),
        )
        .ok()
}

/// Trial-decrypt a scanned payload (wallet scanning)
///
/// AEAD failure is [`TrialDecryption::NotMine`]. A payload that opens but
/// does not decode, or decodes to a different commitment, is an error.
pub fn try_decrypt_note<H: HashFn + ?Sized>(
    encrypted: &EncryptedNote,
    secret: &StaticSecret,
    owner: FieldElement,
    expected: &Commitment,
    leaf_index: u64,
    hasher: &H,
) -> Result<TrialDecryption> {
    let Some(plaintext) = open_note(encrypted, secret) else {
        return Ok(TrialDecryption::NotMine);
    };
    let note = decode_plaintext(&plaintext, owner)?.with_leaf_index(leaf_index);
    check_commitment(note, expected, hasher).map(TrialDecryption::Owned)
}

pub(crate) fn check_commitment<H: HashFn + ?Sized>(
    note: Note,
    expected: &Commitment,
    hasher: &H,
) -> Result<Note> {
    if note.commitment(hasher)? != *expected {
        return Err(PrivacyError::CommitmentMismatch {
            expected: expected.to_string(),
        });
    }
    Ok(note)
}

fn derive_note_key(shared_secret: &[u8], ephemeral_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(NOTE_KEY_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    *hasher.finalize().as_bytes()
}

/// Serialize the note fields a recipient cannot derive
///
/// ```text
/// blinding (32) || tag flag (1) || [app tag (32)] || n (1) || n * (asset (32) || amount (32 LE))
/// ```
pub(crate) fn encode_plaintext(note: &Note) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + 1 + 32 + 1 + note.assets.len() * 64);
    bytes.extend_from_slice(note.blinding.as_bytes());

    match note.app_tag {
        Some(tag) => {
            bytes.push(1);
            bytes.extend_from_slice(tag.as_bytes());
        }
        None => bytes.push(0),
    }

    bytes.push(note.assets.len() as u8);
    for (asset, amount) in note.assets.iter().zip(&note.amounts) {
        bytes.extend_from_slice(asset.as_bytes());
        bytes.extend_from_slice(&amount.to_le_bytes());
    }
    bytes
}

/// Rebuild a validated note owned by `owner`
pub(crate) fn decode_plaintext(bytes: &[u8], owner: FieldElement) -> Result<Note> {
    let mut reader = Reader { bytes, pos: 0 };

    let blinding = FieldElement(reader.take32()?);
    let app_tag = match reader.take_u8()? {
        0 => None,
        1 => Some(FieldElement(reader.take32()?)),
        flag => return Err(malformed(format!("invalid app tag flag {flag}"))),
    };

    let n = reader.take_u8()? as usize;
    if n == 0 || n > MAX_NOTE_ASSETS {
        return Err(malformed(format!("invalid asset count {n}")));
    }
    let mut assets = Vec::with_capacity(n);
    let mut amounts = Vec::with_capacity(n);
    for _ in 0..n {
        assets.push(AssetId(reader.take32()?));
        amounts.push(Amount::from_le_bytes(&reader.take32()?));
    }
    if reader.pos != bytes.len() {
        return Err(malformed(format!(
            "{} trailing bytes",
            bytes.len() - reader.pos
        )));
    }

    let mut note = Note::new(assets, amounts, owner, blinding)
        .map_err(|e| malformed(e.to_string()))?;
    note.app_tag = app_tag;
    Ok(note)
}

fn malformed(msg: String) -> PrivacyError {
    PrivacyError::MalformedPayload(msg)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(malformed(format!(
                "truncated plaintext: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.bytes.len()
            )));
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take32(&mut self) -> Result<[u8; 32]> {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(self.take(32)?);
        Ok(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Blake3Hasher;

    fn generate_keypair() -> (StaticSecret, [u8; 32]) {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        (secret, *public.as_bytes())
    }

    fn sample_note(owner: FieldElement) -> Note {
        Note::with_asset(
            Amount::from(10),
            AssetId([5u8; 32]),
            Amount::from(1000),
            owner,
            FieldElement::from_u64(42),
        )
        .unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_note() {
        let (secret, pk) = generate_keypair();
        let owner = FieldElement::from_u64(1);
        let note = sample_note(owner);
        let commitment = note.commitment(&Blake3Hasher).unwrap();

        let encrypted = encrypt_note(&note, &pk).unwrap();
        let result =
            try_decrypt_note(&encrypted, &secret, owner, &commitment, 3, &Blake3Hasher).unwrap();

        match result {
            TrialDecryption::Owned(decrypted) => {
                assert_eq!(decrypted.amounts, note.amounts);
                assert_eq!(decrypted.blinding, note.blinding);
                assert_eq!(decrypted.leaf_index, Some(3));
            }
            TrialDecryption::NotMine => panic!("payload should open for its recipient"),
        }
    }

    #[test]
    fn test_wrong_key_is_not_mine() {
        let (_, pk) = generate_keypair();
        let (wrong, _) = generate_keypair();
        let owner = FieldElement::from_u64(1);
        let note = sample_note(owner);
        let commitment = note.commitment(&Blake3Hasher).unwrap();

        let encrypted = encrypt_note(&note, &pk).unwrap();
        let result =
            try_decrypt_note(&encrypted, &wrong, owner, &commitment, 0, &Blake3Hasher).unwrap();
        assert_eq!(result, TrialDecryption::NotMine);
    }

    #[test]
    fn test_commitment_mismatch_is_an_error() {
        let (secret, pk) = generate_keypair();
        let owner = FieldElement::from_u64(1);
        let encrypted = encrypt_note(&sample_note(owner), &pk).unwrap();

        let err = try_decrypt_note(
            &encrypted,
            &secret,
            owner,
            &Commitment::ZERO,
            0,
            &Blake3Hasher,
        )
        .unwrap_err();
        assert!(matches!(err, PrivacyError::CommitmentMismatch { .. }));
    }

    #[test]
    fn test_payload_bytes_layout() {
        let (_, pk) = generate_keypair();
        let encrypted = encrypt_note(&sample_note(FieldElement::ZERO), &pk).unwrap();

        let bytes = encrypted.to_bytes();
        assert_eq!(bytes.len(), EncryptedNote::HEADER + encrypted.ciphertext.len());
        assert_eq!(EncryptedNote::from_bytes(&bytes).unwrap(), encrypted);

        let err = EncryptedNote::from_bytes(&bytes[..20]).unwrap_err();
        assert!(matches!(err, PrivacyError::MalformedPayload(_)));
    }

    #[test]
    fn test_plaintext_rejects_truncation_and_trailing_bytes() {
        let note = sample_note(FieldElement::ZERO).with_app_tag(FieldElement::from_u64(8));
        let mut bytes = encode_plaintext(&note);

        let decoded = decode_plaintext(&bytes, FieldElement::ZERO).unwrap();
        assert_eq!(decoded.app_tag, note.app_tag);

        assert!(decode_plaintext(&bytes[..bytes.len() - 1], FieldElement::ZERO).is_err());
        bytes.push(0);
        assert!(decode_plaintext(&bytes, FieldElement::ZERO).is_err());
    }
}
