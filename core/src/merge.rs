//! Merge planning
//!
//! Merging consolidates many small notes of one asset into a single change
//! note so later operations fit the circuit's input arity.

use std::cmp::Reverse;
use std::collections::HashSet;

use shroud_privacy::{Amount, AssetId, Commitment, NoteRecord, NoteState};

use crate::error::{Result, WalletError};
use crate::ledger::Balance;

/// The largest unspent notes of `asset`, at most `max_inputs`
pub fn select_merge_inputs(
    balance: &Balance,
    asset: &AssetId,
    max_inputs: usize,
) -> Result<Vec<NoteRecord>> {
    let mut notes: Vec<&NoteRecord> = balance.unspent_records(asset).collect();
    notes.sort_by_key(|r| (Reverse(r.note.amount_of(asset)), r.commitment));
    notes.truncate(max_inputs);

    if notes.len() < 2 {
        return Err(WalletError::validation(format!(
            "asset {asset} has {} unspent notes, nothing to merge",
            notes.len()
        )));
    }
    Ok(notes.into_iter().cloned().collect())
}

/// Explicitly chosen unspent notes of `asset`
pub fn select_merge_commitments(
    balance: &Balance,
    asset: &AssetId,
    commitments: &[Commitment],
    max_inputs: usize,
) -> Result<Vec<NoteRecord>> {
    if commitments.len() < 2 {
        return Err(WalletError::validation("a merge needs at least two notes"));
    }
    if commitments.len() > max_inputs {
        return Err(WalletError::validation(format!(
            "cannot merge {} notes, at most {} inputs fit",
            commitments.len(),
            max_inputs
        )));
    }

    let ledger = balance
        .ledger(asset)
        .ok_or_else(|| WalletError::validation(format!("no notes of asset {asset}")))?;
    let mut seen = HashSet::new();
    commitments
        .iter()
        .map(|c| {
            if !seen.insert(*c) {
                return Err(WalletError::validation(format!("commitment {c} listed twice")));
            }
            ledger
                .notes(NoteState::Unspent)
                .get(c)
                .cloned()
                .ok_or_else(|| {
                    WalletError::validation(format!("commitment {c} is not an unspent note of {asset}"))
                })
        })
        .collect()
}

/// Add the smallest pure-native note that lets `inputs` pay `fee`
///
/// No-op when the inputs already carry enough native or are native
/// themselves. Fails when no single note fits in the remaining slot.
pub fn add_fee_note(
    balance: &Balance,
    inputs: &mut Vec<NoteRecord>,
    fee: &Amount,
    max_inputs: usize,
) -> Result<()> {
    let carried: Amount = inputs.iter().map(|r| r.note.native_amount()).sum();
    let Some(shortfall) = fee.checked_sub(&carried).filter(|s| !s.is_zero()) else {
        return Ok(());
    };
    if inputs.len() >= max_inputs {
        return Err(WalletError::validation(format!(
            "no input slot left for a fee note, merge at most {} notes",
            max_inputs.saturating_sub(1)
        )));
    }

    let fee_note = balance
        .unspent_records(&AssetId::NATIVE)
        .filter(|r| !inputs.iter().any(|i| i.commitment == r.commitment))
        .filter(|r| r.note.native_amount() >= shortfall)
        .min_by_key(|r| (r.note.native_amount(), r.commitment));
    match fee_note {
        Some(record) => {
            inputs.push(record.clone());
            Ok(())
        }
        None => Err(WalletError::InsufficientFunds {
            asset: AssetId::NATIVE,
            requested: fee.clone(),
            available: balance.total_native(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_privacy::{FieldElement, Note, Nullifier};

    fn fill(amounts: &[u64]) -> Balance {
        let mut balance = Balance::new();
        for (i, a) in amounts.iter().enumerate() {
            let salt = i as u64 + 1;
            let note = Note::native(
                Amount::from(*a),
                FieldElement::from_u64(1),
                FieldElement::from_u64(salt),
            )
            .unwrap();
            let record = NoteRecord {
                note,
                commitment: Commitment::from_element(FieldElement::from_u64(salt)),
                nullifier: Nullifier::from_bytes([salt as u8; 32]),
            };
            balance.add_utxo(AssetId::NATIVE, record, NoteState::Unspent);
        }
        balance
    }

    #[test]
    fn test_merge_takes_largest_first() {
        let balance = fill(&[3, 9, 1, 7, 5]);
        let inputs = select_merge_inputs(&balance, &AssetId::NATIVE, 3).unwrap();
        let amounts: Vec<Amount> = inputs.iter().map(|r| r.note.native_amount()).collect();
        assert_eq!(amounts, vec![Amount::from(9), Amount::from(7), Amount::from(5)]);
    }

    #[test]
    fn test_merge_needs_two_notes() {
        let balance = fill(&[3]);
        assert!(select_merge_inputs(&balance, &AssetId::NATIVE, 10).is_err());
    }

    #[test]
    fn test_merge_commitments_validation() {
        let balance = fill(&[3, 9, 1]);
        let c = |i: u64| Commitment::from_element(FieldElement::from_u64(i));

        let picked =
            select_merge_commitments(&balance, &AssetId::NATIVE, &[c(1), c(3)], 10).unwrap();
        assert_eq!(picked.len(), 2);

        assert!(select_merge_commitments(&balance, &AssetId::NATIVE, &[c(1), c(1)], 10).is_err());
        let native = AssetId::NATIVE;
        assert!(select_merge_commitments(&balance, &native, &[c(1), c(42)], 10).is_err());
        assert!(select_merge_commitments(&balance, &native, &[c(1), c(2), c(3)], 2).is_err());
        assert!(select_merge_commitments(&balance, &native, &[c(2)], 10).is_err());
    }

    #[test]
    fn test_fee_note_for_asset_merge() {
        let usdc = AssetId([3u8; 32]);
        let mut balance = fill(&[2, 9, 4]);
        for salt in 10..13u64 {
            let note = Note::with_asset(
                Amount::zero(),
                usdc,
                Amount::from(salt),
                FieldElement::from_u64(1),
                FieldElement::from_u64(salt),
            )
            .unwrap();
            let record = NoteRecord {
                note,
                commitment: Commitment::from_element(FieldElement::from_u64(salt)),
                nullifier: Nullifier::from_bytes([salt as u8; 32]),
            };
            balance.add_utxo(usdc, record, NoteState::Unspent);
        }

        let mut inputs = select_merge_inputs(&balance, &usdc, 10).unwrap();
        assert_eq!(inputs.len(), 3);
        add_fee_note(&balance, &mut inputs, &Amount::from(3), 10).unwrap();
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[3].note.native_amount(), Amount::from(4));

        let mut full = inputs[..3].to_vec();
        assert!(add_fee_note(&balance, &mut full, &Amount::from(3), 3).is_err());
        let mut short = inputs[..3].to_vec();
        assert!(matches!(
            add_fee_note(&balance, &mut short, &Amount::from(50), 10),
            Err(WalletError::InsufficientFunds { .. })
        ));
    }
}
