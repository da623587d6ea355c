//! Reconciliation of owned notes against chain signals
//!
//! Lookups fan out with a bounded number in flight and are collected
//! before anything is applied. The apply step is a single synchronous pass
//! over the balance; a transport error aborts before it runs.

use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;

use shroud_privacy::{AssetId, Commitment, NoteState};

use crate::chain::ChainLookup;
use crate::error::Result;
use crate::ledger::balance::Balance;

/// A state transition decided by reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerMove {
    pub asset: AssetId,
    pub commitment: Commitment,
    pub to: NoteState,
}

/// Unspent notes whose nullifier is now on chain
pub async fn find_spent<L>(
    balance: &Balance,
    lookup: &L,
    concurrency: usize,
) -> Result<Vec<LedgerMove>>
where
    L: ChainLookup + ?Sized,
{
    let checks = balance.all_unspent().map(|(asset, record)| {
        let nullifier = record.nullifier;
        let commitment = record.commitment;
        async move {
            let hit = lookup.nullifier_exists(&nullifier).await?;
            Ok::<_, crate::chain::TransportError>(hit.then_some(LedgerMove {
                asset,
                commitment,
                to: NoteState::Spent,
            }))
        }
    });

    let moves: Vec<Option<LedgerMove>> = stream::iter(checks)
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(moves.into_iter().flatten().collect())
}

/// Queued notes that were spent or whose pair left the insertion queue
///
/// `left_leaf_of` maps a leaf index to the left leaf of its pair.
pub async fn find_settled<L, F>(
    balance: &Balance,
    left_leaf_of: F,
    lookup: &L,
    concurrency: usize,
) -> Result<Vec<LedgerMove>>
where
    L: ChainLookup + ?Sized,
    F: Fn(u64) -> Option<Commitment>,
{
    let mut candidates = Vec::new();
    for ledger in balance.ledgers() {
        for record in ledger.notes(NoteState::Queued).values() {
            let left_leaf = record
                .note
                .leaf_index
                .and_then(|i| left_leaf_of(i & !1))
                .unwrap_or(record.commitment);
            candidates.push((ledger.asset(), record.commitment, record.nullifier, left_leaf));
        }
    }

    let checks = candidates
        .into_iter()
        .map(|(asset, commitment, nullifier, left_leaf)| async move {
            let (spent, queued) = tokio::try_join!(
                lookup.nullifier_exists(&nullifier),
                lookup.queued_insertion_exists(&left_leaf),
            )?;
            let to = if spent {
                Some(NoteState::Spent)
            } else if !queued {
                Some(NoteState::Unspent)
            } else {
                None
            };
            Ok::<_, crate::chain::TransportError>(to.map(|to| LedgerMove {
                asset,
                commitment,
                to,
            }))
        });

    let moves: Vec<Option<LedgerMove>> = stream::iter(checks)
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(moves.into_iter().flatten().collect())
}

/// Apply reconciliation results, returning how many notes changed state
pub fn apply_moves(balance: &mut Balance, moves: &[LedgerMove]) -> usize {
    let mut changed = 0;
    for m in moves {
        let moved = match m.to {
            NoteState::Spent => balance.move_to_spent(&m.asset, &m.commitment),
            state => match balance.find(&m.commitment) {
                Some((asset, current, record)) if asset == m.asset && current != state => {
                    let record = record.clone();
                    balance.add_utxo(m.asset, record, state)
                }
                _ => false,
            },
        };
        if moved {
            debug!("{} -> {}", m.commitment, m.to);
            changed += 1;
        }
    }
    changed
}

/// Re-check every unspent note and move the nullified ones to spent
///
/// Idempotent. On a transport error the balance is left untouched.
pub async fn reconcile_spent<L>(
    balance: &mut Balance,
    lookup: &L,
    concurrency: usize,
) -> Result<usize>
where
    L: ChainLookup + ?Sized,
{
    let moves = find_spent(balance, lookup, concurrency).await?;
    Ok(apply_moves(balance, &moves))
}
