//! Nullifiers
//!
//! ```text
//! signature = H(sk, commitment, index)
//! Nullifier = H(commitment, index, signature)
//! ```
//!
//! The leaf index is part of the preimage, so the same note inserted twice
//! yields two distinct nullifiers. Publishing a nullifier is the only signal
//! that a note has been spent.

use crate::commitment::Commitment;
use crate::field::{FieldElement, field_newtype};
use crate::hash::HashFn;

field_newtype!(
    /// A nullifier, the one-time spend tag of a note
    Nullifier
);

/// Nullifier derivation key (the account's spending scalar)
#[derive(Clone)]
pub struct NullifierKey {
    key: FieldElement,
}

impl NullifierKey {
    pub fn new(key: FieldElement) -> Self {
        Self { key }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self::new(FieldElement(bytes).reduced())
    }

    pub fn scalar(&self) -> &FieldElement {
        &self.key
    }

    /// Spend authorisation over a leaf
    pub fn sign<H: HashFn + ?Sized>(
        &self,
        hasher: &H,
        commitment: &Commitment,
        index: u64,
    ) -> FieldElement {
        hasher.hash_many(&[
            self.key,
            commitment.to_element(),
            FieldElement::from_u64(index),
        ])
    }

    /// Derive the nullifier of the note committed at `index`
    pub fn derive_nullifier<H: HashFn + ?Sized>(
        &self,
        hasher: &H,
        commitment: &Commitment,
        index: u64,
    ) -> Nullifier {
        let signature = self.sign(hasher, commitment, index);
        Nullifier::from_bytes(
            hasher
                .hash_many(&[
                    commitment.to_element(),
                    FieldElement::from_u64(index),
                    signature,
                ])
                .0,
        )
    }
}

impl std::fmt::Debug for NullifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NullifierKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Blake3Hasher;

    #[test]
    fn test_nullifier_deterministic() {
        let key = NullifierKey::from_bytes([1u8; 32]);
        let commitment = Commitment([2u8; 32]);

        let n1 = key.derive_nullifier(&Blake3Hasher, &commitment, 100);
        let n2 = key.derive_nullifier(&Blake3Hasher, &commitment, 100);
        assert_eq!(n1, n2, "same inputs should produce same nullifier");
    }

    #[test]
    fn test_nullifier_requires_key() {
        let key1 = NullifierKey::from_bytes([1u8; 32]);
        let key2 = NullifierKey::from_bytes([2u8; 32]);
        let commitment = Commitment([3u8; 32]);

        assert_ne!(
            key1.derive_nullifier(&Blake3Hasher, &commitment, 0),
            key2.derive_nullifier(&Blake3Hasher, &commitment, 0),
        );
    }

    #[test]
    fn test_index_affects_nullifier() {
        let key = NullifierKey::from_bytes([1u8; 32]);
        let commitment = Commitment([2u8; 32]);

        assert_ne!(
            key.derive_nullifier(&Blake3Hasher, &commitment, 0),
            key.derive_nullifier(&Blake3Hasher, &commitment, 1),
            "different leaf indices should produce different nullifiers"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = NullifierKey::from_bytes([9u8; 32]);
        assert_eq!(format!("{key:?}"), "NullifierKey(..)");
    }
}
