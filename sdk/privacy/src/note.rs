//! Shielded Notes
//!
//! ```text
//! Note = {
//!     assets:     [NATIVE] or [NATIVE, asset],
//!     amounts:    one amount per asset slot,
//!     owner:      account public key,
//!     blinding:   random field element,
//!     app_tag:    optional program data hash,
//!     leaf_index: position in the commitment tree (set on insertion),
//! }
//! ```
//!
//! Notes are never mutated once committed. Moving a note between ledger
//! states moves its [`NoteRecord`].

use ark_bn254::Fr;
use ark_ff::PrimeField;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::commitment::{self, Commitment};
use crate::error::{PrivacyError, Result};
use crate::field::{Amount, AssetId, FieldElement};
use crate::hash::HashFn;
use crate::nullifier::Nullifier;

/// Maximum number of asset slots in one note
pub const MAX_NOTE_ASSETS: usize = 2;

/// A shielded note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub assets: Vec<AssetId>,
    pub amounts: Vec<Amount>,
    pub owner: FieldElement,
    pub blinding: FieldElement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_tag: Option<FieldElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_index: Option<u64>,
}

impl Note {
    /// Create a validated note
    pub fn new(
        assets: Vec<AssetId>,
        amounts: Vec<Amount>,
        owner: FieldElement,
        blinding: FieldElement,
    ) -> Result<Self> {
        let note = Self {
            assets,
            amounts,
            owner,
            blinding,
            app_tag: None,
            leaf_index: None,
        };
        note.validate()?;
        Ok(note)
    }

    /// A note holding only the native asset
    pub fn native(amount: Amount, owner: FieldElement, blinding: FieldElement) -> Result<Self> {
        Self::new(vec![AssetId::NATIVE], vec![amount], owner, blinding)
    }

    /// A two-slot note holding `native` plus `amount` of `asset`
    pub fn with_asset(
        native: Amount,
        asset: AssetId,
        amount: Amount,
        owner: FieldElement,
        blinding: FieldElement,
    ) -> Result<Self> {
        Self::new(
            vec![AssetId::NATIVE, asset],
            vec![native, amount],
            owner,
            blinding,
        )
    }

    pub fn random_blinding<R: RngCore + ?Sized>(rng: &mut R) -> FieldElement {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        FieldElement::from_field(Fr::from_le_bytes_mod_order(&bytes))
    }

    /// Check the asset layout and amount bounds
    pub fn validate(&self) -> Result<()> {
        if self.assets.len() != self.amounts.len() {
            return Err(PrivacyError::validation(format!(
                "note has {} assets but {} amounts",
                self.assets.len(),
                self.amounts.len()
            )));
        }
        if self.assets.is_empty() || self.assets.len() > MAX_NOTE_ASSETS {
            return Err(PrivacyError::validation(format!(
                "note must carry 1..={} assets, got {}",
                MAX_NOTE_ASSETS,
                self.assets.len()
            )));
        }
        if !self.assets[0].is_native() {
            return Err(PrivacyError::validation(
                "the first asset slot must be the native asset",
            ));
        }
        if self.assets.len() == 2 && self.assets[1].is_native() {
            return Err(PrivacyError::validation(
                "the second asset slot must not repeat the native asset",
            ));
        }
        if let Some(amount) = self.amounts.iter().find(|a| !a.fits_field()) {
            return Err(PrivacyError::validation(format!(
                "amount {amount} exceeds the field modulus"
            )));
        }
        Ok(())
    }

    /// Amount held of `asset`, zero when the note has no such slot
    pub fn amount_of(&self, asset: &AssetId) -> Amount {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| self.amounts[i].clone())
            .unwrap_or_default()
    }

    pub fn native_amount(&self) -> Amount {
        self.amounts.first().cloned().unwrap_or_default()
    }

    /// The non-native asset slot, if any
    pub fn designated_asset(&self) -> Option<AssetId> {
        self.assets.get(1).copied()
    }

    /// Asset whose ledger owns this note
    ///
    /// The second slot if it holds a non-zero amount, otherwise native.
    pub fn ledger_asset(&self) -> AssetId {
        match (self.assets.get(1), self.amounts.get(1)) {
            (Some(asset), Some(amount)) if !amount.is_zero() => *asset,
            _ => AssetId::NATIVE,
        }
    }

    /// Whether every amount is zero
    pub fn is_zero(&self) -> bool {
        self.amounts.iter().all(Amount::is_zero)
    }

    pub fn with_leaf_index(mut self, index: u64) -> Self {
        self.leaf_index = Some(index);
        self
    }

    pub fn with_app_tag(mut self, tag: FieldElement) -> Self {
        self.app_tag = Some(tag);
        self
    }

    /// Whether the note carries a program tag other than the default
    pub fn has_app_tag(&self) -> bool {
        self.app_tag.is_some_and(|t| !t.is_zero())
    }

    pub fn commitment<H: HashFn + ?Sized>(&self, hasher: &H) -> Result<Commitment> {
        commitment::commit(
            hasher,
            &self.assets,
            &self.amounts,
            &self.owner,
            &self.blinding,
            self.app_tag.as_ref(),
        )
    }
}

/// Lifecycle state of an owned note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteState {
    Unspent,
    /// Inserted on chain, not yet visible in the tree
    Queued,
    Spent,
}

impl std::fmt::Display for NoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoteState::Unspent => "unspent",
            NoteState::Queued => "queued",
            NoteState::Spent => "spent",
        };
        f.write_str(s)
    }
}

/// A note with its cached commitment and nullifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub note: Note,
    pub commitment: Commitment,
    pub nullifier: Nullifier,
}
