//! Note Selection
//!
//! "Biggest covers, smallest fills": candidates of the designated asset are
//! scanned largest first and added only while the target is still
//! uncovered. Once a second note was needed it is swapped for the smallest
//! unselected note that still covers; the first (largest) note is never
//! swapped. The native requirement (amount plus fee) is then met from
//! pure-native notes in the remaining input slots, then from unselected
//! notes of the designated asset, falling back to swapping the weakest
//! selected note.
//!
//! Selection is a pure function over a borrowed [`Balance`].

use std::cmp::Reverse;

use log::debug;

use shroud_privacy::{Amount, AssetId, Commitment, NoteRecord};

use crate::error::{Result, WalletError};
use crate::ledger::Balance;

/// What an operation needs from the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    /// Designated asset; NATIVE for native-only operations
    pub asset: AssetId,
    pub asset_amount: Amount,
    /// Native amount on top of the fee
    pub native_amount: Amount,
    pub fee: Amount,
    /// Hard cap from the circuit's input arity
    pub max_inputs: usize,
    /// Soft cap on notes of the designated asset
    pub preferred_asset_notes: usize,
}

impl SelectionRequest {
    /// Total native amount the inputs must carry
    pub fn native_required(&self) -> Amount {
        &self.native_amount + &self.fee
    }
}

/// Chosen inputs with their totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<NoteRecord>,
    pub asset: AssetId,
    pub asset_total: Amount,
    pub native_total: Amount,
}

impl Selection {
    fn new(asset: AssetId, inputs: Vec<NoteRecord>) -> Self {
        let asset_total = inputs.iter().map(|r| r.note.amount_of(&asset)).sum();
        let native_total = inputs.iter().map(|r| r.note.native_amount()).sum();
        Self {
            inputs,
            asset,
            asset_total,
            native_total,
        }
    }

    pub fn commitments(&self) -> Vec<Commitment> {
        self.inputs.iter().map(|r| r.commitment).collect()
    }
}

/// Choose input notes covering `req`
pub fn select_in_utxos(balance: &Balance, req: &SelectionRequest) -> Result<Selection> {
    if req.max_inputs == 0 {
        return Err(WalletError::validation("max_inputs must be at least 1"));
    }
    let native_required = req.native_required();

    if req.asset.is_native() {
        let target = &req.asset_amount + &native_required;
        let inputs = cover_native(balance, &target, req)?;
        return Ok(Selection::new(req.asset, to_owned(inputs)));
    }

    let mut inputs = if req.asset_amount.is_zero() {
        Vec::new()
    } else {
        cover(balance, &req.asset, &req.asset_amount, req)?
    };
    fill_native(balance, req, &mut inputs, &native_required)?;

    let selection = Selection::new(req.asset, to_owned(inputs));
    debug!(
        "selected {} inputs: {} of {}, {} native",
        selection.inputs.len(),
        selection.asset_total,
        selection.asset,
        selection.native_total
    );
    Ok(selection)
}

fn to_owned(records: Vec<&NoteRecord>) -> Vec<NoteRecord> {
    records.into_iter().cloned().collect()
}

/// Unspent notes of `asset`'s ledger, largest amount first
fn candidates<'a>(balance: &'a Balance, ledger: &AssetId, key: &AssetId) -> Vec<&'a NoteRecord> {
    let mut out: Vec<&NoteRecord> = balance.unspent_records(ledger).collect();
    out.sort_by_key(|r| (Reverse(r.note.amount_of(key)), r.commitment));
    out
}

/// Cover `target` of `asset` under the preferred cap, then the hard cap
fn cover<'a>(
    balance: &'a Balance,
    asset: &AssetId,
    target: &Amount,
    req: &SelectionRequest,
) -> Result<Vec<&'a NoteRecord>> {
    if target.is_zero() {
        return Ok(Vec::new());
    }
    let available = balance
        .ledger(asset)
        .map(|l| l.total_asset().clone())
        .unwrap_or_default();
    if &available < target {
        return Err(WalletError::InsufficientFunds {
            asset: *asset,
            requested: target.clone(),
            available,
        });
    }

    let pool = candidates(balance, asset, asset);
    let preferred = req.preferred_asset_notes.clamp(1, req.max_inputs);
    if let Some(selected) = biggest_smallest(&pool, asset, target, preferred) {
        return Ok(selected);
    }
    if req.max_inputs > preferred {
        if let Some(selected) = biggest_smallest(&pool, asset, target, req.max_inputs) {
            debug!(
                "{} of {} needs {} notes, above the preferred {}",
                target,
                asset,
                selected.len(),
                preferred
            );
            return Ok(selected);
        }
    }

    Err(WalletError::NoViableSelection {
        asset: *asset,
        requested: target.clone(),
        available,
        max_inputs: req.max_inputs,
    })
}

/// Cover a native-only `target`, from pure-native notes when they suffice
///
/// Otherwise every unspent note carrying native is a candidate, pure-native
/// notes first among equal amounts.
fn cover_native<'a>(
    balance: &'a Balance,
    target: &Amount,
    req: &SelectionRequest,
) -> Result<Vec<&'a NoteRecord>> {
    if target.is_zero() {
        return Ok(Vec::new());
    }
    let available = balance.total_native();
    if &available < target {
        return Err(WalletError::InsufficientFunds {
            asset: AssetId::NATIVE,
            requested: target.clone(),
            available,
        });
    }

    let pure = balance
        .ledger(&AssetId::NATIVE)
        .map(|l| l.total_asset().clone())
        .unwrap_or_default();
    if &pure >= target {
        if let Ok(selected) = cover(balance, &AssetId::NATIVE, target, req) {
            return Ok(selected);
        }
    }

    let pool = native_carriers(balance.all_unspent().map(|(_, r)| r));
    debug!("{} native needs notes of other ledgers", target);
    biggest_smallest(&pool, &AssetId::NATIVE, target, req.max_inputs).ok_or(
        WalletError::NoViableSelection {
            asset: AssetId::NATIVE,
            requested: target.clone(),
            available,
            max_inputs: req.max_inputs,
        },
    )
}

/// Notes carrying native, largest first, pure-native ahead on ties
fn native_carriers<'a>(records: impl Iterator<Item = &'a NoteRecord>) -> Vec<&'a NoteRecord> {
    let mut out: Vec<&NoteRecord> = records
        .filter(|r| !r.note.native_amount().is_zero())
        .collect();
    out.sort_by_key(|r| {
        (
            Reverse(r.note.native_amount()),
            r.note.designated_asset().is_some(),
            r.commitment,
        )
    });
    out
}

fn biggest_smallest<'a>(
    pool: &[&'a NoteRecord],
    asset: &AssetId,
    target: &Amount,
    cap: usize,
) -> Option<Vec<&'a NoteRecord>> {
    let mut selected: Vec<&NoteRecord> = Vec::new();
    let mut sum = Amount::zero();

    for &record in pool {
        if &sum >= target || selected.len() == cap {
            break;
        }
        sum += &record.note.amount_of(asset);
        selected.push(record);
    }
    if &sum < target {
        return None;
    }

    if selected.len() >= 2 {
        let second = selected[1].note.amount_of(asset);
        let rest = sum.saturating_sub(&second);
        let picked: Vec<Commitment> = selected.iter().map(|r| r.commitment).collect();
        let better = pool.iter().rev().find(|r| {
            let amount = r.note.amount_of(asset);
            !picked.contains(&r.commitment) && amount < second && &(&rest + &amount) >= target
        });
        if let Some(&better) = better {
            selected[1] = better;
        }
    }
    Some(selected)
}

fn native_of(records: &[&NoteRecord]) -> Amount {
    records.iter().map(|r| r.note.native_amount()).sum()
}

/// Top up the native amount carried by `inputs`
fn fill_native<'a>(
    balance: &'a Balance,
    req: &SelectionRequest,
    inputs: &mut Vec<&'a NoteRecord>,
    required: &Amount,
) -> Result<()> {
    let carried = native_of(inputs.as_slice());
    let Some(shortfall) = required.checked_sub(&carried).filter(|s| !s.is_zero()) else {
        return Ok(());
    };

    let pool: Vec<&NoteRecord> = candidates(balance, &AssetId::NATIVE, &AssetId::NATIVE)
        .into_iter()
        .filter(|r| !inputs.iter().any(|i| i.commitment == r.commitment))
        .collect();
    let free = req.max_inputs.saturating_sub(inputs.len());

    if let Some(extra) = native_fill(&pool, &shortfall, free) {
        inputs.extend(extra);
        return Ok(());
    }
    // designated-asset notes may carry the native into a free slot
    let mixed = native_carriers(
        pool.iter()
            .copied()
            .chain(balance.unspent_records(&req.asset))
            .filter(|r| !inputs.iter().any(|i| i.commitment == r.commitment)),
    );
    if let Some(extra) = native_fill(&mixed, &shortfall, free) {
        debug!("topped up {} native from designated-asset notes", shortfall);
        inputs.extend(extra);
        return Ok(());
    }
    if swap_weakest(balance, req, inputs, &pool, required) {
        debug!("swapped a selected note to carry {} native", required);
        return Ok(());
    }

    let available = balance.total_native();
    if &available < required {
        return Err(WalletError::InsufficientFunds {
            asset: AssetId::NATIVE,
            requested: required.clone(),
            available,
        });
    }
    Err(WalletError::NoViableSelection {
        asset: AssetId::NATIVE,
        requested: required.clone(),
        available,
        max_inputs: req.max_inputs,
    })
}

/// Smallest single pure-native note covering the shortfall, else the largest few
fn native_fill<'a>(
    pool: &[&'a NoteRecord],
    shortfall: &Amount,
    free: usize,
) -> Option<Vec<&'a NoteRecord>> {
    if free == 0 {
        return None;
    }
    if let Some(single) = pool
        .iter()
        .rev()
        .find(|r| &r.note.native_amount() >= shortfall)
    {
        return Some(vec![*single]);
    }

    let mut picked = Vec::new();
    let mut sum = Amount::zero();
    for record in pool.iter().take(free) {
        sum += &record.note.native_amount();
        picked.push(*record);
        if &sum >= shortfall {
            return Some(picked);
        }
    }
    None
}

/// Replace one non-first input so both requirements hold
///
/// Inputs are tried weakest native carrier first; replacements come from
/// the unselected designated-asset notes and the pure-native pool.
fn swap_weakest<'a>(
    balance: &'a Balance,
    req: &SelectionRequest,
    inputs: &mut [&'a NoteRecord],
    native_pool: &[&'a NoteRecord],
    required: &Amount,
) -> bool {
    if inputs.len() < 2 {
        return false;
    }
    let asset_sum: Amount = inputs.iter().map(|r| r.note.amount_of(&req.asset)).sum();
    let native_sum = native_of(inputs);

    let mut order: Vec<usize> = (1..inputs.len()).collect();
    order.sort_by_key(|&i| {
        (
            inputs[i].note.native_amount(),
            inputs[i].note.amount_of(&req.asset),
        )
    });

    let mut replacements: Vec<&NoteRecord> = balance
        .unspent_records(&req.asset)
        .filter(|r| !inputs.iter().any(|i| i.commitment == r.commitment))
        .chain(native_pool.iter().copied())
        .collect();
    replacements.sort_by_key(|r| (r.note.native_amount(), r.commitment));

    for i in order {
        let out = inputs[i];
        let asset_rest = asset_sum.saturating_sub(&out.note.amount_of(&req.asset));
        let native_rest = native_sum.saturating_sub(&out.note.native_amount());
        let found = replacements.iter().find(|r| {
            &(&asset_rest + &r.note.amount_of(&req.asset)) >= &req.asset_amount
                && &(&native_rest + &r.note.native_amount()) >= required
        });
        if let Some(&replacement) = found {
            inputs[i] = replacement;
            return true;
        }
    }
    false
}
