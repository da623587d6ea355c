//! Per-account note cryptography
//!
//! The ledger never touches key material directly. It trial-decrypts and
//! nullifies through a [`NoteCryptography`] implementation: [`crate::Account`]
//! for real keys, [`crate::MockCryptography`] for deterministic tests.

use crate::commitment::Commitment;
use crate::encryption::EncryptedNote;
use crate::error::Result;
use crate::field::FieldElement;
use crate::note::Note;
use crate::nullifier::Nullifier;

/// Outcome of trial-decrypting a scanned payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialDecryption {
    /// The payload belongs to this account; the note carries its leaf index
    Owned(Note),
    /// Sealed for someone else. Routine, not an error.
    NotMine,
}

impl TrialDecryption {
    pub fn into_note(self) -> Option<Note> {
        match self {
            TrialDecryption::Owned(note) => Some(note),
            TrialDecryption::NotMine => None,
        }
    }
}

/// Account-scoped key operations
pub trait NoteCryptography: Send + Sync {
    /// Owner field committed into this account's notes
    fn owner(&self) -> FieldElement;

    /// X25519 key senders encrypt to
    fn encryption_public_key(&self) -> [u8; 32];

    /// Nullifier of an owned note; the note must carry its leaf index
    fn nullifier(&self, note: &Note) -> Result<Nullifier>;

    /// Trial-decrypt the payload stored next to leaf `leaf_index`
    ///
    /// `NotMine` when the payload was sealed for another key. A payload that
    /// opens but cannot be decoded or does not reproduce `expected` is an error.
    fn decrypt(
        &self,
        payload: &EncryptedNote,
        expected: &Commitment,
        leaf_index: u64,
    ) -> Result<TrialDecryption>;

    /// Seal a note for `recipient`
    fn encrypt(&self, note: &Note, recipient: &[u8; 32]) -> Result<EncryptedNote>;
}
