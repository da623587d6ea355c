//! Note Commitments
//!
//! ```text
//! amountHash = H(amount_0, .., amount_n)
//! assetHash  = H(asset_0, .., asset_n)
//! Commitment = H(amountHash, owner, blinding, assetHash, appTag)
//! ```
//!
//! A missing app tag hashes as zero.

use crate::error::Result;
use crate::field::{Amount, AssetId, FieldElement, field_newtype};
use crate::hash::HashFn;

field_newtype!(
    /// A note commitment, the value stored as a tree leaf
    Commitment
);

impl Commitment {
    pub fn to_element(&self) -> FieldElement {
        FieldElement(self.0)
    }

    pub fn from_element(fe: FieldElement) -> Self {
        Self(fe.0)
    }
}

/// Commit to the given note fields
///
/// Fails if any amount does not fit the scalar field.
pub fn commit<H: HashFn + ?Sized>(
    hasher: &H,
    assets: &[AssetId],
    amounts: &[Amount],
    owner: &FieldElement,
    blinding: &FieldElement,
    app_tag: Option<&FieldElement>,
) -> Result<Commitment> {
    let amount_elems = amounts
        .iter()
        .map(Amount::to_element)
        .collect::<Result<Vec<_>>>()?;
    let asset_elems: Vec<FieldElement> = assets.iter().map(AssetId::to_element).collect();

    let amount_hash = hasher.hash_many(&amount_elems);
    let asset_hash = hasher.hash_many(&asset_elems);
    let tag = app_tag.copied().unwrap_or(FieldElement::ZERO);

    Ok(Commitment::from_element(hasher.hash_many(&[
        amount_hash,
        *owner,
        *blinding,
        asset_hash,
        tag,
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Blake3Hasher, PoseidonHasher};

    fn asset() -> AssetId {
        AssetId([7u8; 32])
    }

    #[test]
    fn test_commitment_deterministic() {
        let h = PoseidonHasher::new();
        let owner = FieldElement::from_u64(1);
        let blinding = FieldElement::from_u64(42);
        let assets = [AssetId::NATIVE, asset()];
        let amounts = [Amount::from(5), Amount::from(1000)];

        let c1 = commit(&h, &assets, &amounts, &owner, &blinding, None).unwrap();
        let c2 = commit(&h, &assets, &amounts, &owner, &blinding, None).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_commitment_hiding() {
        let h = Blake3Hasher;
        let owner = FieldElement::from_u64(1);
        let assets = [AssetId::NATIVE];
        let amounts = [Amount::from(5)];

        let c1 = commit(&h, &assets, &amounts, &owner, &FieldElement::from_u64(1), None).unwrap();
        let c2 = commit(&h, &assets, &amounts, &owner, &FieldElement::from_u64(2), None).unwrap();
        assert_ne!(c1, c2, "different blinding should produce different commitments");
    }

    #[test]
    fn test_commitment_binds_app_tag() {
        let h = Blake3Hasher;
        let owner = FieldElement::from_u64(1);
        let blinding = FieldElement::from_u64(3);
        let assets = [AssetId::NATIVE];
        let amounts = [Amount::from(5)];
        let tag = FieldElement::from_u64(99);

        let plain = commit(&h, &assets, &amounts, &owner, &blinding, None).unwrap();
        let zero_tag =
            commit(&h, &assets, &amounts, &owner, &blinding, Some(&FieldElement::ZERO)).unwrap();
        let tagged = commit(&h, &assets, &amounts, &owner, &blinding, Some(&tag)).unwrap();

        assert_eq!(plain, zero_tag);
        assert_ne!(plain, tagged);
    }

    #[test]
    fn test_commitment_rejects_oversized_amount() {
        let h = Blake3Hasher;
        let huge = Amount::new(crate::field::field_modulus().clone());
        let res = commit(
            &h,
            &[AssetId::NATIVE],
            &[huge],
            &FieldElement::ZERO,
            &FieldElement::ZERO,
            None,
        );
        assert!(res.is_err());
    }
}
