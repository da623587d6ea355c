//! Chain collaborators
//!
//! The ledger reads two authoritative signals from the chain: whether a
//! nullifier has been published, and whether a leaf pair is still waiting
//! in the insertion queue. Historical replay reads leaf pairs with their
//! encrypted payloads from a [`LeafSource`].
//!
//! Retry and timeout policy belongs to the implementations. Errors are
//! propagated as [`TransportError`] and never read as "absent".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shroud_privacy::{Commitment, EncryptedNote, Nullifier};

/// A failed chain lookup or fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Existence checks against chain state
#[async_trait]
pub trait ChainLookup: Send + Sync {
    async fn nullifier_exists(&self, nullifier: &Nullifier) -> Result<bool, TransportError>;

    /// Whether the pair whose left leaf is `left_leaf` is still queued for insertion
    async fn queued_insertion_exists(&self, left_leaf: &Commitment)
    -> Result<bool, TransportError>;
}

#[async_trait]
impl<T: ChainLookup + ?Sized> ChainLookup for Arc<T> {
    async fn nullifier_exists(&self, nullifier: &Nullifier) -> Result<bool, TransportError> {
        (**self).nullifier_exists(nullifier).await
    }

    async fn queued_insertion_exists(
        &self,
        left_leaf: &Commitment,
    ) -> Result<bool, TransportError> {
        (**self).queued_insertion_exists(left_leaf).await
    }
}

/// One inserted leaf pair with the payloads published next to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafBatch {
    /// Index of the left leaf; the right leaf sits at `left_index + 1`
    pub left_index: u64,
    pub leaves: [Commitment; 2],
    pub payloads: [EncryptedNote; 2],
}

/// Ordered, restartable history of inserted leaf pairs
#[async_trait]
pub trait LeafSource: Send + Sync {
    /// Every batch containing a leaf at or after `first_leaf_index`, ascending
    async fn batches_from(&self, first_leaf_index: u64) -> Result<Vec<LeafBatch>, TransportError>;
}

/// In-memory [`ChainLookup`] with failure injection
#[derive(Debug, Default)]
pub struct MemoryChain {
    nullifiers: DashSet<Nullifier>,
    queued: DashSet<Commitment>,
    failing: AtomicBool,
    lookups: AtomicU64,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_nullifier(&self, nullifier: Nullifier) {
        self.nullifiers.insert(nullifier);
    }

    pub fn queue_insertion(&self, left_leaf: Commitment) {
        self.queued.insert(left_leaf);
    }

    /// The queued pair landed in the tree
    pub fn complete_insertion(&self, left_leaf: &Commitment) {
        self.queued.remove(left_leaf);
    }

    /// Make every lookup fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of lookups served so far
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TransportError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::new("memory chain is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainLookup for MemoryChain {
    async fn nullifier_exists(&self, nullifier: &Nullifier) -> Result<bool, TransportError> {
        self.check()?;
        Ok(self.nullifiers.contains(nullifier))
    }

    async fn queued_insertion_exists(
        &self,
        left_leaf: &Commitment,
    ) -> Result<bool, TransportError> {
        self.check()?;
        Ok(self.queued.contains(left_leaf))
    }
}

/// In-memory [`LeafSource`] that appends pairs at consecutive indices
#[derive(Debug, Default)]
pub struct MemoryLeafSource {
    batches: DashMap<u64, LeafBatch>,
    next_index: AtomicU64,
    failing: AtomicBool,
}

impl MemoryLeafSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair, returning its left index
    pub fn push_pair(&self, leaves: [Commitment; 2], payloads: [EncryptedNote; 2]) -> u64 {
        let left_index = self.next_index.fetch_add(2, Ordering::SeqCst);
        self.batches.insert(
            left_index,
            LeafBatch {
                left_index,
                leaves,
                payloads,
            },
        );
        left_index
    }

    /// Insert a batch verbatim (gaps and overlaps allowed)
    pub fn insert_batch(&self, batch: LeafBatch) {
        self.next_index
            .fetch_max(batch.left_index + 2, Ordering::SeqCst);
        self.batches.insert(batch.left_index, batch);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeafSource for MemoryLeafSource {
    async fn batches_from(&self, first_leaf_index: u64) -> Result<Vec<LeafBatch>, TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::new("memory leaf source is unavailable"));
        }
        let mut out: Vec<LeafBatch> = self
            .batches
            .iter()
            .filter(|entry| entry.left_index + 1 >= first_leaf_index)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|b| b.left_index);
        Ok(out)
    }
}
