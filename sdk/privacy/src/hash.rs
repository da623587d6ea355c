//! Pluggable field hashes
//!
//! The tree and the note commitment are generic over [`HashFn`]. Production
//! code uses [`PoseidonHasher`]; [`Blake3Hasher`] is a fast deterministic
//! stand-in for tests and local tooling.

use std::sync::Arc;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::PrimeField;

use crate::field::FieldElement;

/// A deterministic hash over field elements
pub trait HashFn: Send + Sync {
    /// Two-to-one compression, used for every tree node
    fn hash2(&self, a: &FieldElement, b: &FieldElement) -> FieldElement;

    /// Variable-arity hash, used for commitments and nullifiers
    fn hash_many(&self, inputs: &[FieldElement]) -> FieldElement {
        inputs
            .iter()
            .fold(FieldElement::ZERO, |acc, x| self.hash2(&acc, x))
    }
}

impl<T: HashFn + ?Sized> HashFn for Arc<T> {
    fn hash2(&self, a: &FieldElement, b: &FieldElement) -> FieldElement {
        (**self).hash2(a, b)
    }

    fn hash_many(&self, inputs: &[FieldElement]) -> FieldElement {
        (**self).hash_many(inputs)
    }
}

/// Poseidon sponge over BN254
///
/// Rate 2, capacity 1, 8 full and 57 partial rounds, alpha 5.
/// Cloning shares the round constants.
#[derive(Clone)]
pub struct PoseidonHasher {
    config: Arc<PoseidonConfig<Fr>>,
}

impl PoseidonHasher {
    pub fn new() -> Self {
        Self {
            config: Arc::new(poseidon_config()),
        }
    }

    fn sponge_hash(&self, inputs: &[FieldElement]) -> FieldElement {
        let mut sponge = PoseidonSponge::new(&self.config);
        for input in inputs {
            sponge.absorb(&input.to_field());
        }
        let out: Fr = sponge.squeeze_field_elements(1)[0];
        FieldElement::from_field(out)
    }
}

impl Default for PoseidonHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoseidonHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseidonHasher").finish_non_exhaustive()
    }
}

impl HashFn for PoseidonHasher {
    fn hash2(&self, a: &FieldElement, b: &FieldElement) -> FieldElement {
        self.sponge_hash(&[*a, *b])
    }

    fn hash_many(&self, inputs: &[FieldElement]) -> FieldElement {
        self.sponge_hash(inputs)
    }
}

fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits: u64 = Fr::MODULUS_BIT_SIZE as u64;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;

    let (ark, mds) =
        find_poseidon_ark_and_mds::<Fr>(prime_bits, rate, full_rounds, partial_rounds, 0);

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}

/// blake3 keyed hash reduced into the scalar field
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Blake3Hasher {
    const CONTEXT: &'static str = "shroud blake3 field hash v1";
}

impl HashFn for Blake3Hasher {
    fn hash2(&self, a: &FieldElement, b: &FieldElement) -> FieldElement {
        self.hash_many(&[*a, *b])
    }

    fn hash_many(&self, inputs: &[FieldElement]) -> FieldElement {
        let mut hasher = blake3::Hasher::new_derive_key(Self::CONTEXT);
        hasher.update(&(inputs.len() as u32).to_le_bytes());
        for input in inputs {
            hasher.update(input.as_bytes());
        }
        let digest = hasher.finalize();
        FieldElement::from_field(Fr::from_le_bytes_mod_order(digest.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poseidon_deterministic() {
        let h = PoseidonHasher::new();
        let a = FieldElement::from_u64(1);
        let b = FieldElement::from_u64(2);

        assert_eq!(h.hash2(&a, &b), h.clone().hash2(&a, &b));
        assert_ne!(h.hash2(&a, &b), h.hash2(&b, &a));
    }

    #[test]
    fn test_poseidon_hash2_matches_hash_many() {
        let h = PoseidonHasher::new();
        let a = FieldElement::from_u64(7);
        let b = FieldElement::from_u64(9);
        assert_eq!(h.hash2(&a, &b), h.hash_many(&[a, b]));
    }

    #[test]
    fn test_blake3_arity_is_bound() {
        let h = Blake3Hasher;
        let z = FieldElement::ZERO;
        assert_ne!(h.hash_many(&[z]), h.hash_many(&[z, z]));
    }

    #[test]
    fn test_output_is_canonical() {
        let h = Blake3Hasher;
        let out = h.hash2(&FieldElement([0xff; 32]), &FieldElement([0xee; 32]));
        assert_eq!(FieldElement::from_field(out.to_field()), out);
    }
}
