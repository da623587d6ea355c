//! Trial decryption and classification of scanned payloads

use log::debug;
use serde::{Deserialize, Serialize};

use shroud_privacy::{
    AssetId, Commitment, EncryptedNote, NoteCryptography, NoteRecord, NoteState, TrialDecryption,
};

use crate::chain::ChainLookup;
use crate::error::Result;

/// Where a scanned payload sits in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanContext {
    pub leaf_index: u64,
    /// Commitment stored at `leaf_index`
    pub commitment: Commitment,
    /// Left leaf of the pair, the key of the insertion queue
    pub left_leaf: Commitment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Keep notes tagged for an application program
    pub accept_app_notes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Every amount is zero (circuit padding)
    ZeroValue,
    /// Tagged for an application program
    AppTagged,
}

/// An owned note with the state the chain puts it in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedNote {
    pub asset: AssetId,
    pub state: NoteState,
    pub record: NoteRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    NotMine,
    Rejected {
        commitment: Commitment,
        reason: RejectReason,
    },
    Owned(ClassifiedNote),
}

/// Decrypt one payload and classify it against the chain
///
/// Nothing is written to the ledger. A nullifier on chain means spent,
/// otherwise a queued pair means queued, otherwise unspent. Transport
/// errors propagate.
pub async fn decrypt_and_classify<C, L>(
    crypto: &C,
    lookup: &L,
    payload: &EncryptedNote,
    ctx: &ScanContext,
    policy: ScanPolicy,
) -> Result<Classification>
where
    C: NoteCryptography + ?Sized,
    L: ChainLookup + ?Sized,
{
    let note = match crypto.decrypt(payload, &ctx.commitment, ctx.leaf_index)? {
        TrialDecryption::NotMine => return Ok(Classification::NotMine),
        TrialDecryption::Owned(note) => note,
    };

    let reason = if note.is_zero() {
        Some(RejectReason::ZeroValue)
    } else if note.has_app_tag() && !policy.accept_app_notes {
        Some(RejectReason::AppTagged)
    } else {
        None
    };
    if let Some(reason) = reason {
        debug!("leaf {} rejected: {:?}", ctx.leaf_index, reason);
        return Ok(Classification::Rejected {
            commitment: ctx.commitment,
            reason,
        });
    }

    let nullifier = crypto.nullifier(&note)?;
    let (spent, queued) = tokio::try_join!(
        lookup.nullifier_exists(&nullifier),
        lookup.queued_insertion_exists(&ctx.left_leaf),
    )?;

    let state = if spent {
        NoteState::Spent
    } else if queued {
        NoteState::Queued
    } else {
        NoteState::Unspent
    };
    let asset = note.ledger_asset();
    debug!("leaf {} owned: asset {} {}", ctx.leaf_index, asset, state);

    Ok(Classification::Owned(ClassifiedNote {
        asset,
        state,
        record: NoteRecord {
            note,
            commitment: ctx.commitment,
            nullifier,
        },
    }))
}
