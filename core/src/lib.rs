//! Shroud Wallet Core
//!
//! Client-side state for one account in the shielded pool: a mirror of the
//! commitment tree, the ledger of owned notes and the planning of new
//! operations over them.
//!
//! ```text
//!   LeafSource ──► sync ──┐                     ┌──► select_in_utxos
//!                         ├─► WalletSession ────┤
//!   ChainLookup ─► reconcile                    └──► synthesize_outputs
//!                         │      │                          │
//!                         ▼      ▼                          ▼
//!                   MerkleMirror  Balance            TransactionPlan
//! ```
//!
//! Proving, relaying and submission live outside this crate.

pub mod chain;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod params;
pub mod selection;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod synthesis;

pub use chain::{
    ChainLookup, LeafBatch, LeafSource, MemoryChain, MemoryLeafSource, TransportError,
};
pub use error::{Result, WalletError};
pub use ledger::{AssetLedger, Balance, Classification, ClassifiedNote, LedgerMove, ScanPolicy};
pub use params::WalletParams;
pub use selection::{Selection, SelectionRequest, select_in_utxos};
pub use session::{
    CommitSummary, LedgerUpdate, MergeRequest, OperationRequest, TransactionPlan, WalletSession,
};
pub use snapshot::WalletSnapshot;
pub use sync::SyncReport;
pub use synthesis::{Action, SynthesisRequest, conservation_holds, synthesize_outputs};

#[cfg(test)]
mod tests;
