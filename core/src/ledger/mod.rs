//! Note Ledger
//!
//! Owned notes move `Unspent -> Queued -> Unspent -> Spent`. A note may also
//! arrive already spent when history is replayed out of order. The
//! published nullifier is the only signal that moves a note to spent.

pub mod balance;
pub mod classify;
pub mod reconcile;

pub use balance::{AssetLedger, Balance};
pub use classify::{
    Classification, ClassifiedNote, RejectReason, ScanContext, ScanPolicy, decrypt_and_classify,
};
pub use reconcile::{LedgerMove, apply_moves, find_settled, find_spent, reconcile_spent};
