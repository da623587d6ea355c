//! Per-asset note balances
//!
//! Each [`AssetLedger`] holds three disjoint maps keyed by commitment
//! (unspent, queued, spent) and two running totals over the unspent map:
//! the ledger asset and the native amount those notes carry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use shroud_privacy::{Amount, AssetId, Commitment, NoteRecord, NoteState};

const STATES: [NoteState; 3] = [NoteState::Unspent, NoteState::Queued, NoteState::Spent];

/// Notes of one asset across the three lifecycle states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "LedgerMaps", try_from = "LedgerMaps")]
pub struct AssetLedger {
    asset: AssetId,
    unspent: BTreeMap<Commitment, NoteRecord>,
    queued: BTreeMap<Commitment, NoteRecord>,
    spent: BTreeMap<Commitment, NoteRecord>,
    total_asset: Amount,
    total_native: Amount,
}

impl AssetLedger {
    pub fn new(asset: AssetId) -> Self {
        Self {
            asset,
            unspent: BTreeMap::new(),
            queued: BTreeMap::new(),
            spent: BTreeMap::new(),
            total_asset: Amount::zero(),
            total_native: Amount::zero(),
        }
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    pub fn notes(&self, state: NoteState) -> &BTreeMap<Commitment, NoteRecord> {
        match state {
            NoteState::Unspent => &self.unspent,
            NoteState::Queued => &self.queued,
            NoteState::Spent => &self.spent,
        }
    }

    fn notes_mut(&mut self, state: NoteState) -> &mut BTreeMap<Commitment, NoteRecord> {
        match state {
            NoteState::Unspent => &mut self.unspent,
            NoteState::Queued => &mut self.queued,
            NoteState::Spent => &mut self.spent,
        }
    }

    /// Sum of the ledger asset over unspent notes
    pub fn total_asset(&self) -> &Amount {
        &self.total_asset
    }

    /// Sum of the native amount over unspent notes
    pub fn total_native(&self) -> &Amount {
        &self.total_native
    }

    pub fn state_of(&self, commitment: &Commitment) -> Option<NoteState> {
        STATES
            .into_iter()
            .find(|s| self.notes(*s).contains_key(commitment))
    }

    /// Insert or overwrite `record` under `state`
    ///
    /// The commitment is first evicted from every other map. Spent is
    /// terminal: a spent commitment is never moved back. Returns whether
    /// the commitment was absent from the target map.
    pub fn add(&mut self, record: NoteRecord, state: NoteState) -> bool {
        let commitment = record.commitment;
        if state != NoteState::Spent && self.spent.contains_key(&commitment) {
            return false;
        }
        let previous = self.take(&commitment);
        let is_new = !matches!(&previous, Some((s, _)) if *s == state);

        if state == NoteState::Unspent {
            self.credit(&record);
        }
        self.notes_mut(state).insert(commitment, record);
        is_new
    }

    /// Move an unspent or queued note to spent
    pub fn move_to_spent(&mut self, commitment: &Commitment) -> bool {
        match self.take(commitment) {
            Some((NoteState::Spent, record)) => {
                self.spent.insert(*commitment, record);
                false
            }
            Some((_, record)) => {
                self.spent.insert(*commitment, record);
                true
            }
            None => false,
        }
    }

    /// Remove a commitment from whichever map holds it
    fn take(&mut self, commitment: &Commitment) -> Option<(NoteState, NoteRecord)> {
        for state in STATES {
            if let Some(record) = self.notes_mut(state).remove(commitment) {
                if state == NoteState::Unspent {
                    self.debit(&record);
                }
                return Some((state, record));
            }
        }
        None
    }

    fn credit(&mut self, record: &NoteRecord) {
        self.total_asset += &record.note.amount_of(&self.asset);
        self.total_native += &record.note.native_amount();
    }

    fn debit(&mut self, record: &NoteRecord) {
        self.total_asset = self
            .total_asset
            .saturating_sub(&record.note.amount_of(&self.asset));
        self.total_native = self
            .total_native
            .saturating_sub(&record.note.native_amount());
    }

    /// Totals match the unspent map and no commitment sits in two maps
    pub fn is_consistent(&self) -> bool {
        let asset: Amount = self
            .unspent
            .values()
            .map(|r| r.note.amount_of(&self.asset))
            .sum();
        let native: Amount = self.unspent.values().map(|r| r.note.native_amount()).sum();
        let disjoint = self
            .unspent
            .keys()
            .all(|c| !self.queued.contains_key(c) && !self.spent.contains_key(c))
            && self.queued.keys().all(|c| !self.spent.contains_key(c));

        disjoint && asset == self.total_asset && native == self.total_native
    }
}

/// Persisted form of an [`AssetLedger`]; totals are recomputed on load
#[derive(Serialize, Deserialize)]
struct LedgerMaps {
    asset: AssetId,
    unspent: BTreeMap<Commitment, NoteRecord>,
    queued: BTreeMap<Commitment, NoteRecord>,
    spent: BTreeMap<Commitment, NoteRecord>,
}

impl From<AssetLedger> for LedgerMaps {
    fn from(l: AssetLedger) -> Self {
        Self {
            asset: l.asset,
            unspent: l.unspent,
            queued: l.queued,
            spent: l.spent,
        }
    }
}

impl TryFrom<LedgerMaps> for AssetLedger {
    type Error = String;

    fn try_from(maps: LedgerMaps) -> Result<Self, Self::Error> {
        let mut ledger = AssetLedger::new(maps.asset);
        for (state, map) in [
            (NoteState::Unspent, maps.unspent),
            (NoteState::Queued, maps.queued),
            (NoteState::Spent, maps.spent),
        ] {
            for (key, record) in map {
                if key != record.commitment {
                    return Err(format!(
                        "record keyed by {key} caches commitment {}",
                        record.commitment
                    ));
                }
                if ledger.state_of(&key).is_some() {
                    return Err(format!("commitment {key} appears in more than one state"));
                }
                ledger.add(record, state);
            }
        }
        Ok(ledger)
    }
}

/// All asset ledgers of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    ledgers: BTreeMap<AssetId, AssetLedger>,
}

impl Balance {
    /// A balance with an empty native ledger
    pub fn new() -> Self {
        let mut ledgers = BTreeMap::new();
        ledgers.insert(AssetId::NATIVE, AssetLedger::new(AssetId::NATIVE));
        Self { ledgers }
    }

    pub fn ledger(&self, asset: &AssetId) -> Option<&AssetLedger> {
        self.ledgers.get(asset)
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &AssetLedger> {
        self.ledgers.values()
    }

    /// Insert into `asset`'s ledger, creating it on first use
    pub fn add_utxo(&mut self, asset: AssetId, record: NoteRecord, state: NoteState) -> bool {
        self.ledgers
            .entry(asset)
            .or_insert_with(|| AssetLedger::new(asset))
            .add(record, state)
    }

    pub fn move_to_spent(&mut self, asset: &AssetId, commitment: &Commitment) -> bool {
        self.ledgers
            .get_mut(asset)
            .is_some_and(|l| l.move_to_spent(commitment))
    }

    /// Locate a commitment across every ledger
    pub fn find(&self, commitment: &Commitment) -> Option<(AssetId, NoteState, &NoteRecord)> {
        self.ledgers.values().find_map(|l| {
            STATES.into_iter().find_map(|s| {
                l.notes(s)
                    .get(commitment)
                    .map(|record| (l.asset, s, record))
            })
        })
    }

    /// Native amount across every ledger's unspent notes
    pub fn total_native(&self) -> Amount {
        self.ledgers.values().map(|l| l.total_native()).sum()
    }

    pub fn unspent_records(&self, asset: &AssetId) -> impl Iterator<Item = &NoteRecord> {
        self.ledgers
            .get(asset)
            .into_iter()
            .flat_map(|l| l.unspent.values())
    }

    /// Every unspent note with the ledger that owns it
    pub fn all_unspent(&self) -> impl Iterator<Item = (AssetId, &NoteRecord)> {
        self.ledgers
            .values()
            .flat_map(|l| l.unspent.values().map(move |r| (l.asset, r)))
    }

    /// Every owned note in every state
    pub fn records(&self) -> impl Iterator<Item = (AssetId, NoteState, &NoteRecord)> {
        self.ledgers.values().flat_map(|l| {
            STATES
                .into_iter()
                .flat_map(move |s| l.notes(s).values().map(move |r| (l.asset, s, r)))
        })
    }

    pub fn count(&self, state: NoteState) -> usize {
        self.ledgers.values().map(|l| l.notes(state).len()).sum()
    }

    pub fn is_consistent(&self) -> bool {
        self.ledgers.values().all(AssetLedger::is_consistent)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::new()
    }
}
