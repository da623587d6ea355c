//! Output Synthesis
//!
//! Builds the output notes of an operation so that, per asset,
//! `inputs + credit == recipients + change + debit`. Recipients come first
//! and are emitted unchanged; change notes follow and go to the sender.

use std::collections::BTreeMap;

use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use shroud_privacy::{Amount, AssetId, FieldElement, Note};

use crate::error::{Result, WalletError};

/// Direction of the public amounts of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Public amounts enter the pool
    Fund,
    /// Only the fee leaves the pool
    Transfer,
    /// Public amounts leave the pool
    Withdraw,
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub action: Action,
    pub inputs: &'a [Note],
    pub recipients: &'a [Note],
    /// The designated asset of the public delta, if any
    pub public_asset: Option<AssetId>,
    pub public_native: Amount,
    pub public_asset_amount: Amount,
    /// Native debit paid to the relayer
    pub fee: Amount,
    pub change_owner: FieldElement,
    /// Output arity of the circuit
    pub max_outputs: usize,
    /// Put native change in its own note
    pub separate_native_change: bool,
    /// Native kept alongside asset change when splitting
    pub native_reserve: Amount,
}

impl SynthesisRequest<'_> {
    /// Public credit and debit for `asset`
    fn public_delta(&self, asset: &AssetId) -> (Amount, Amount) {
        let public = if asset.is_native() {
            self.public_native.clone()
        } else if self.public_asset.as_ref() == Some(asset) {
            self.public_asset_amount.clone()
        } else {
            Amount::zero()
        };
        let fee = if asset.is_native() {
            self.fee.clone()
        } else {
            Amount::zero()
        };
        match self.action {
            Action::Fund => (public, fee),
            Action::Withdraw => (Amount::zero(), public + fee),
            Action::Transfer => (Amount::zero(), fee),
        }
    }

    /// Every asset the operation may touch, native first
    fn touched_assets(&self) -> Vec<AssetId> {
        let mut assets = vec![AssetId::NATIVE];
        let from_inputs = self.inputs.iter().flat_map(|n| n.assets.iter().copied());
        for asset in from_inputs.chain(self.public_asset) {
            if !assets.contains(&asset) {
                assets.push(asset);
            }
        }
        assets
    }
}

fn totals<'n>(notes: impl IntoIterator<Item = &'n Note>) -> BTreeMap<AssetId, Amount> {
    let mut totals: BTreeMap<AssetId, Amount> = BTreeMap::new();
    for note in notes {
        for (asset, amount) in note.assets.iter().zip(&note.amounts) {
            *totals.entry(*asset).or_default() += amount;
        }
    }
    totals
}

fn validate(req: &SynthesisRequest<'_>) -> Result<()> {
    if let Some(asset) = req.public_asset {
        if asset.is_native() {
            return Err(WalletError::validation(
                "the public asset must be non-native, use the native amount instead",
            ));
        }
    } else if !req.public_asset_amount.is_zero() {
        return Err(WalletError::validation(
            "a public asset amount needs a public asset",
        ));
    }
    if req.action == Action::Transfer
        && !(req.public_native.is_zero() && req.public_asset_amount.is_zero())
    {
        return Err(WalletError::validation(
            "a transfer carries no public amount besides the fee",
        ));
    }

    let touched = req.touched_assets();
    for note in req.inputs.iter().chain(req.recipients) {
        note.validate()?;
    }
    for (i, recipient) in req.recipients.iter().enumerate() {
        if let Some(asset) = recipient.assets.iter().find(|a| !touched.contains(a)) {
            return Err(WalletError::validation(format!(
                "recipient {i} references asset {asset} which is neither an input nor the public asset"
            )));
        }
    }
    Ok(())
}

/// Produce recipients plus change for one operation
///
/// Fails before emitting anything if a recipient asks for more than inputs
/// and credit provide.
pub fn synthesize_outputs<R>(req: &SynthesisRequest<'_>, rng: &mut R) -> Result<Vec<Note>>
where
    R: RngCore + ?Sized,
{
    validate(req)?;

    let inputs = totals(req.inputs);
    let wanted = totals(req.recipients);

    let mut surplus = BTreeMap::new();
    for asset in req.touched_assets() {
        let (credit, debit) = req.public_delta(&asset);
        let available = inputs.get(&asset).cloned().unwrap_or_default() + credit;
        let requested = wanted.get(&asset).cloned().unwrap_or_default() + debit;
        let Some(left) = available.checked_sub(&requested) else {
            return Err(WalletError::InsufficientFunds {
                asset,
                requested,
                available,
            });
        };
        surplus.insert(asset, left);
    }

    let mut native_left = surplus.remove(&AssetId::NATIVE).unwrap_or_default();
    let asset_change: Vec<(AssetId, Amount)> = surplus
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .collect();

    let mut change = Vec::new();
    if req.separate_native_change && !asset_change.is_empty() {
        if let Some(split) = native_left.checked_sub(&req.native_reserve) {
            if !split.is_zero() {
                change.push(Note::native(
                    split,
                    req.change_owner,
                    Note::random_blinding(rng),
                )?);
                native_left = req.native_reserve.clone();
            }
        }
    }
    if asset_change.is_empty() {
        if !native_left.is_zero() {
            change.push(Note::native(
                native_left,
                req.change_owner,
                Note::random_blinding(rng),
            )?);
        }
    } else {
        for (asset, amount) in asset_change {
            let native = std::mem::take(&mut native_left);
            change.push(Note::with_asset(
                native,
                asset,
                amount,
                req.change_owner,
                Note::random_blinding(rng),
            )?);
        }
    }

    let requested = req.recipients.len() + change.len();
    if requested > req.max_outputs {
        return Err(WalletError::TooManyOutputs {
            requested,
            max: req.max_outputs,
        });
    }
    debug!(
        "{:?}: {} recipients, {} change notes",
        req.action,
        req.recipients.len(),
        change.len()
    );

    let mut outputs = req.recipients.to_vec();
    outputs.extend(change);
    if !conservation_holds(req, &outputs) {
        return Err(WalletError::validation("outputs do not balance the inputs"));
    }
    Ok(outputs)
}

/// Whether `outputs` balance `req` for every asset touched
pub fn conservation_holds(req: &SynthesisRequest<'_>, outputs: &[Note]) -> bool {
    let inputs = totals(req.inputs);
    let outs = totals(outputs);
    let touched = req.touched_assets();
    let mut assets = touched.clone();
    assets.extend(outs.keys().filter(|a| !touched.contains(a)).copied());

    assets.iter().all(|asset| {
        let (credit, debit) = req.public_delta(asset);
        let left = inputs.get(asset).cloned().unwrap_or_default() + credit;
        let right = outs.get(asset).cloned().unwrap_or_default() + debit;
        left == right
    })
}
