//! Wallet Session
//!
//! One account's view of the pool: the mirrored commitment tree, the note
//! ledger and the parameters of the circuits it plans for.
//!
//! Planning borrows the session immutably and never mutates it. Every state
//! change (replayed leaves, scanned notes, reconciliation moves) goes
//! through [`WalletSession::commit`]. The session holds its collaborators;
//! they never hold the session.

use std::sync::Arc;

use log::{debug, info};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use shroud_privacy::{
    Amount, AssetId, Commitment, EncryptedNote, FieldElement, HashFn, MerkleMirror, MerklePath,
    Note, NoteCryptography, NoteRecord, NoteState, PrivacyError,
};

use crate::chain::{ChainLookup, LeafSource};
use crate::error::{Result, WalletError};
use crate::ledger::{
    Balance, Classification, ClassifiedNote, LedgerMove, ScanContext, apply_moves,
    decrypt_and_classify, find_settled, find_spent,
};
use crate::merge::{add_fee_note, select_merge_commitments, select_merge_inputs};
use crate::params::WalletParams;
use crate::selection::{SelectionRequest, select_in_utxos};
use crate::snapshot::WalletSnapshot;
use crate::synthesis::{Action, SynthesisRequest, synthesize_outputs};
use crate::sync::{SyncReport, collect_history};

/// Everything one commit applies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerUpdate {
    /// Leaves appended to the mirror, in index order
    pub new_leaves: Vec<Commitment>,
    pub classified: Vec<ClassifiedNote>,
    pub moves: Vec<LedgerMove>,
}

impl LedgerUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_leaves.is_empty() && self.classified.is_empty() && self.moves.is_empty()
    }
}

/// What a commit changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub leaves: usize,
    /// Commitments that were new to their target state
    pub added: usize,
    pub moved: usize,
}

/// A shielded operation to plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub action: Action,
    /// Designated asset; NATIVE for native-only operations
    pub asset: AssetId,
    pub recipients: Vec<Note>,
    pub public_native: Amount,
    pub public_asset_amount: Amount,
    /// Overrides the configured relayer fee
    pub fee: Option<Amount>,
}

impl OperationRequest {
    /// Move notes to `recipients` inside the pool
    pub fn transfer(asset: AssetId, recipients: Vec<Note>) -> Self {
        Self {
            action: Action::Transfer,
            asset,
            recipients,
            public_native: Amount::zero(),
            public_asset_amount: Amount::zero(),
            fee: None,
        }
    }

    /// Deposit public amounts as `recipients`
    pub fn fund(
        asset: AssetId,
        native: Amount,
        asset_amount: Amount,
        recipients: Vec<Note>,
    ) -> Self {
        Self {
            action: Action::Fund,
            asset,
            recipients,
            public_native: native,
            public_asset_amount: asset_amount,
            fee: None,
        }
    }

    /// Leave the pool with public amounts
    pub fn withdraw(asset: AssetId, native: Amount, asset_amount: Amount) -> Self {
        Self {
            action: Action::Withdraw,
            asset,
            recipients: Vec::new(),
            public_native: native,
            public_asset_amount: asset_amount,
            fee: None,
        }
    }

    pub fn with_fee(mut self, fee: Amount) -> Self {
        self.fee = Some(fee);
        self
    }
}

/// Consolidate notes of one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub asset: AssetId,
    /// Explicit inputs; the largest notes when `None`
    pub commitments: Option<Vec<Commitment>>,
    pub fee: Option<Amount>,
}

/// Inputs, outputs and inclusion data for the prover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub action: Action,
    pub asset: AssetId,
    pub inputs: Vec<NoteRecord>,
    /// One path per input, same order
    pub input_paths: Vec<MerklePath>,
    pub outputs: Vec<Note>,
    pub output_commitments: Vec<Commitment>,
    /// Root every input path leads to
    pub root: FieldElement,
    pub public_native: Amount,
    pub public_asset_amount: Amount,
    pub fee: Amount,
}

pub struct WalletSession<C: ?Sized, L, H> {
    tree: MerkleMirror<H>,
    balance: Balance,
    params: WalletParams,
    crypto: Arc<C>,
    lookup: L,
}

impl<C, L, H> WalletSession<C, L, H>
where
    C: NoteCryptography + ?Sized,
    L: ChainLookup,
    H: HashFn,
{
    /// Start from an empty tree and ledger
    pub fn new(crypto: Arc<C>, lookup: L, hasher: H, params: WalletParams) -> Result<Self> {
        params.validate()?;
        let tree = MerkleMirror::new(params.tree_depth, params.zero_value, hasher)?;
        Ok(Self {
            tree,
            balance: Balance::new(),
            params,
            crypto,
            lookup,
        })
    }

    /// Resume from a snapshot
    ///
    /// The tree must match the configured depth and zero value, and every
    /// owned note with a leaf index must sit at that index. No hash is
    /// recomputed.
    pub fn restore(
        snapshot: WalletSnapshot,
        crypto: Arc<C>,
        lookup: L,
        hasher: H,
        params: WalletParams,
    ) -> Result<Self> {
        params.validate()?;
        let WalletSnapshot { tree, balance, .. } = snapshot;
        if tree.depth != params.tree_depth {
            return Err(WalletError::Snapshot(format!(
                "snapshot tree depth {} does not match configured depth {}",
                tree.depth, params.tree_depth
            )));
        }
        if tree.zeros.first() != Some(&params.zero_value) {
            return Err(WalletError::Snapshot(
                "snapshot zero value does not match the configured one".into(),
            ));
        }
        let tree = MerkleMirror::restore(tree, hasher)?;

        for (_, state, record) in balance.records() {
            if let Some(index) = record.note.leaf_index {
                if tree.leaf(index) != Some(record.commitment) {
                    return Err(WalletError::Snapshot(format!(
                        "{state} note {} is not at leaf {index}",
                        record.commitment
                    )));
                }
            }
        }

        info!(
            "Restored wallet: {} leaves, {} unspent notes, {} native",
            tree.len(),
            balance.count(NoteState::Unspent),
            balance.total_native()
        );
        Ok(Self {
            tree,
            balance,
            params,
            crypto,
            lookup,
        })
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot::new(self.tree.snapshot(), self.balance.clone())
    }

    pub fn tree(&self) -> &MerkleMirror<H> {
        &self.tree
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn params(&self) -> &WalletParams {
        &self.params
    }

    pub fn crypto(&self) -> &Arc<C> {
        &self.crypto
    }

    pub fn root(&self) -> FieldElement {
        self.tree.root()
    }

    /// Apply an update: leaves first, then classified notes, then moves
    ///
    /// The tree insertion is checked before anything is written, so a
    /// failed commit leaves the session unchanged.
    pub fn commit(&mut self, update: LedgerUpdate) -> Result<CommitSummary> {
        let mut summary = CommitSummary::default();
        if !update.new_leaves.is_empty() {
            self.tree.bulk_insert(&update.new_leaves)?;
            summary.leaves = update.new_leaves.len();
        }
        for note in update.classified {
            if self.balance.add_utxo(note.asset, note.record, note.state) {
                summary.added += 1;
            }
        }
        summary.moved = apply_moves(&mut self.balance, &update.moves);
        debug!(
            "commit: {} leaves, {} notes added, {} moved",
            summary.leaves, summary.added, summary.moved
        );
        Ok(summary)
    }

    /// Replay leaf history from the mirror's current length
    ///
    /// Transport errors abort before anything is committed.
    pub async fn sync<S>(&mut self, source: &S) -> Result<SyncReport>
    where
        S: LeafSource + ?Sized,
    {
        let (update, report) = collect_history(
            source,
            &*self.crypto,
            &self.lookup,
            self.tree.len(),
            self.params.scan_policy,
            self.params.max_concurrency,
        )
        .await?;
        self.commit(update)?;
        info!(
            "Synced {} new leaves: {} owned ({} already spent), {} rejected, {} malformed",
            report.new_leaves,
            report.owned,
            report.spent_on_arrival,
            report.rejected,
            report.malformed
        );
        Ok(report)
    }

    /// Classify one payload whose leaf is already mirrored
    pub async fn scan_payload(
        &mut self,
        payload: &EncryptedNote,
        leaf_index: u64,
    ) -> Result<Classification> {
        let commitment = self.tree.leaf(leaf_index).ok_or(PrivacyError::IndexOutOfRange {
            index: leaf_index,
            len: self.tree.len(),
        })?;
        let left_leaf = self.tree.leaf(leaf_index & !1).unwrap_or(commitment);
        let ctx = ScanContext {
            leaf_index,
            commitment,
            left_leaf,
        };

        let class = decrypt_and_classify(
            &*self.crypto,
            &self.lookup,
            payload,
            &ctx,
            self.params.scan_policy,
        )
        .await?;
        if let Classification::Owned(note) = &class {
            self.commit(LedgerUpdate {
                classified: vec![note.clone()],
                ..Default::default()
            })?;
        }
        Ok(class)
    }

    /// Re-check owned notes against the chain
    ///
    /// Unspent notes with a published nullifier become spent. Queued notes
    /// become spent or unspent once the chain settles them. Returns the
    /// number of notes that changed state.
    pub async fn reconcile(&mut self) -> Result<usize> {
        let concurrency = self.params.max_concurrency;
        let mut moves = find_spent(&self.balance, &self.lookup, concurrency).await?;
        let tree = &self.tree;
        let settled = find_settled(&self.balance, |i| tree.leaf(i), &self.lookup, concurrency);
        moves.extend(settled.await?);

        let summary = self.commit(LedgerUpdate {
            moves,
            ..Default::default()
        })?;
        if summary.moved > 0 {
            info!("Reconciled {} notes", summary.moved);
        }
        Ok(summary.moved)
    }

    /// Plan a fund, transfer or withdrawal
    pub fn plan<R>(&self, req: &OperationRequest, rng: &mut R) -> Result<TransactionPlan>
    where
        R: RngCore + ?Sized,
    {
        let fee = match (&req.fee, req.action) {
            (Some(fee), _) => fee.clone(),
            (None, Action::Fund) => Amount::zero(),
            (None, _) => self.params.relayer_fee.clone(),
        };
        if req.asset.is_native() && !req.public_asset_amount.is_zero() {
            return Err(WalletError::validation(
                "a native operation carries its public amount as public_native",
            ));
        }

        let (asset_need, native_need) = self.input_requirement(req, &fee);
        let selection = select_in_utxos(
            &self.balance,
            &SelectionRequest {
                asset: req.asset,
                asset_amount: asset_need,
                native_amount: native_need,
                fee: Amount::zero(),
                max_inputs: self.params.max_inputs,
                preferred_asset_notes: self.params.preferred_asset_notes,
            },
        )?;

        let public_asset = (!req.asset.is_native()).then_some(req.asset);
        self.finish_plan(
            req.action,
            req.asset,
            selection.inputs,
            &req.recipients,
            public_asset,
            req.public_native.clone(),
            req.public_asset_amount.clone(),
            fee,
            rng,
        )
    }

    /// Plan a merge of notes of one asset into one change note
    pub fn plan_merge<R>(&self, req: &MergeRequest, rng: &mut R) -> Result<TransactionPlan>
    where
        R: RngCore + ?Sized,
    {
        let fee = req
            .fee
            .clone()
            .unwrap_or_else(|| self.params.relayer_fee.clone());
        let max_inputs = self.params.merge_max_inputs;
        let mut inputs = match &req.commitments {
            Some(commitments) => {
                select_merge_commitments(&self.balance, &req.asset, commitments, max_inputs)?
            }
            None => select_merge_inputs(&self.balance, &req.asset, max_inputs)?,
        };
        let carried: Amount = inputs.iter().map(|r| r.note.native_amount()).sum();
        if carried < fee && inputs.len() == max_inputs && req.commitments.is_none() {
            // keep a slot for the fee note
            inputs.pop();
        }
        add_fee_note(&self.balance, &mut inputs, &fee, max_inputs)?;

        self.finish_plan(
            Action::Transfer,
            req.asset,
            inputs,
            &[],
            None,
            Amount::zero(),
            Amount::zero(),
            fee,
            rng,
        )
    }

    /// Asset and native amounts the inputs must carry, fee included
    ///
    /// A fund's public credit pays recipients and the fee before any input is drawn.
    fn input_requirement(&self, req: &OperationRequest, fee: &Amount) -> (Amount, Amount) {
        let mut asset_need = Amount::zero();
        let mut native_need = fee.clone();
        for note in &req.recipients {
            native_need += &note.native_amount();
            if !req.asset.is_native() {
                asset_need += &note.amount_of(&req.asset);
            }
        }
        match req.action {
            Action::Fund => (
                asset_need.saturating_sub(&req.public_asset_amount),
                native_need.saturating_sub(&req.public_native),
            ),
            Action::Withdraw => (
                asset_need + req.public_asset_amount.clone(),
                native_need + req.public_native.clone(),
            ),
            Action::Transfer => (asset_need, native_need),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_plan<R>(
        &self,
        action: Action,
        asset: AssetId,
        inputs: Vec<NoteRecord>,
        recipients: &[Note],
        public_asset: Option<AssetId>,
        public_native: Amount,
        public_asset_amount: Amount,
        fee: Amount,
        rng: &mut R,
    ) -> Result<TransactionPlan>
    where
        R: RngCore + ?Sized,
    {
        let input_notes: Vec<Note> = inputs.iter().map(|r| r.note.clone()).collect();
        let outputs = synthesize_outputs(
            &SynthesisRequest {
                action,
                inputs: &input_notes,
                recipients,
                public_asset,
                public_native: public_native.clone(),
                public_asset_amount: public_asset_amount.clone(),
                fee: fee.clone(),
                change_owner: self.crypto.owner(),
                max_outputs: self.params.max_outputs,
                separate_native_change: self.params.separate_native_change,
                native_reserve: self.params.native_change_reserve.clone(),
            },
            rng,
        )?;

        let input_paths = inputs
            .iter()
            .map(|record| self.inclusion_path(record))
            .collect::<Result<Vec<_>>>()?;
        let output_commitments = outputs
            .iter()
            .map(|note| note.commitment(self.tree.hasher()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            "planned {:?}: {} inputs, {} outputs, fee {}",
            action,
            inputs.len(),
            outputs.len(),
            fee
        );
        Ok(TransactionPlan {
            action,
            asset,
            inputs,
            input_paths,
            outputs,
            output_commitments,
            root: self.tree.root(),
            public_native,
            public_asset_amount,
            fee,
        })
    }

    fn inclusion_path(&self, record: &NoteRecord) -> Result<MerklePath> {
        let index = record.note.leaf_index.ok_or_else(|| {
            WalletError::validation(format!("note {} has no leaf index", record.commitment))
        })?;
        if self.tree.leaf(index) != Some(record.commitment) {
            return Err(WalletError::validation(format!(
                "note {} is not at leaf {index} of the mirror",
                record.commitment
            )));
        }
        Ok(self.tree.path(index)?)
    }
}
