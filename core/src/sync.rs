//! Bulk replay of leaf history
//!
//! Pairs are fetched from the mirror's current length, checked for gaps and
//! classified with a bounded number of decryptions in flight. Nothing is
//! applied here: the result is one [`LedgerUpdate`] for the session to
//! commit, which inserts the new leaves with a single tree rebuild.

use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use shroud_privacy::{Commitment, EncryptedNote, NoteCryptography, NoteState, PrivacyError};

use crate::chain::{ChainLookup, LeafBatch, LeafSource};
use crate::error::{Result, WalletError};
use crate::ledger::{Classification, ScanContext, ScanPolicy, decrypt_and_classify};
use crate::session::LedgerUpdate;

/// Counters of one replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub batches: usize,
    pub new_leaves: usize,
    /// Leaves already present in the mirror
    pub skipped_leaves: usize,
    pub owned: usize,
    pub spent_on_arrival: usize,
    pub rejected: usize,
    /// Payloads that decrypted but could not be decoded or verified
    pub malformed: usize,
}

#[derive(Debug)]
struct Job {
    ctx: ScanContext,
    payload: EncryptedNote,
}

#[derive(Debug)]
enum Outcome {
    Classified(Classification),
    Malformed,
}

/// Lay out the leaves that extend a mirror of `mirror_len` leaves
fn plan_leaves(
    batches: Vec<LeafBatch>,
    mirror_len: u64,
    report: &mut SyncReport,
) -> Result<(Vec<Commitment>, Vec<Job>)> {
    let mut next = mirror_len;
    let mut leaves = Vec::new();
    let mut jobs = Vec::new();

    for batch in batches {
        if batch.left_index % 2 != 0 {
            return Err(WalletError::validation(format!(
                "leaf pair starts at odd index {}",
                batch.left_index
            )));
        }
        report.batches += 1;
        let left_leaf = batch.leaves[0];
        let pairs = batch.leaves.into_iter().zip(batch.payloads);
        for (offset, (commitment, payload)) in pairs.enumerate() {
            let leaf_index = batch.left_index + offset as u64;
            if leaf_index < next {
                report.skipped_leaves += 1;
                continue;
            }
            if leaf_index > next {
                return Err(WalletError::validation(format!(
                    "leaf history has a gap: expected index {next}, got {leaf_index}"
                )));
            }
            leaves.push(commitment);
            jobs.push(Job {
                ctx: ScanContext {
                    leaf_index,
                    commitment,
                    left_leaf,
                },
                payload,
            });
            next += 1;
        }
    }
    report.new_leaves = leaves.len();
    Ok((leaves, jobs))
}

/// Fetch and classify everything after the first `mirror_len` leaves
pub async fn collect_history<S, C, L>(
    source: &S,
    crypto: &C,
    lookup: &L,
    mirror_len: u64,
    policy: ScanPolicy,
    concurrency: usize,
) -> Result<(LedgerUpdate, SyncReport)>
where
    S: LeafSource + ?Sized,
    C: NoteCryptography + ?Sized,
    L: ChainLookup + ?Sized,
{
    let mut report = SyncReport::default();
    let batches = source.batches_from(mirror_len).await?;
    let (new_leaves, jobs) = plan_leaves(batches, mirror_len, &mut report)?;
    debug!(
        "replaying {} leaves from index {} ({} already mirrored)",
        new_leaves.len(),
        mirror_len,
        report.skipped_leaves
    );

    let tasks = jobs.into_iter().map(|job| async move {
        match decrypt_and_classify(crypto, lookup, &job.payload, &job.ctx, policy).await {
            Ok(class) => Ok(Outcome::Classified(class)),
            Err(WalletError::Privacy(
                e @ (PrivacyError::MalformedPayload(_) | PrivacyError::CommitmentMismatch { .. }),
            )) => {
                warn!("skipping leaf {}: {}", job.ctx.leaf_index, e);
                Ok(Outcome::Malformed)
            }
            Err(e) => Err(e),
        }
    });
    let outcomes: Vec<Outcome> = stream::iter(tasks)
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut classified = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Malformed => report.malformed += 1,
            Outcome::Classified(Classification::NotMine) => {}
            Outcome::Classified(Classification::Rejected { .. }) => report.rejected += 1,
            Outcome::Classified(Classification::Owned(note)) => {
                report.owned += 1;
                if note.state == NoteState::Spent {
                    report.spent_on_arrival += 1;
                }
                classified.push(note);
            }
        }
    }
    classified.sort_by_key(|n| n.record.note.leaf_index);

    let update = LedgerUpdate {
        new_leaves,
        classified,
        moves: Vec::new(),
    };
    Ok((update, report))
}
