//! Error definitions for the wallet core.
use thiserror::Error;

use shroud_privacy::{Amount, AssetId, PrivacyError};

use crate::chain::TransportError;

/// Errors surfaced by ledger, selection, synthesis and the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Note, tree or payload level failure
    #[error(transparent)]
    Privacy(#[from] PrivacyError),

    /// A chain lookup or leaf fetch failed; never retried here
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed request
    #[error("validation error: {0}")]
    Validation(String),

    /// Not enough value in the ledger to cover the request
    #[error("insufficient funds for asset {asset}: requested {requested}, available {available}")]
    InsufficientFunds {
        asset: AssetId,
        requested: Amount,
        available: Amount,
    },

    /// Enough value exists but not within the input cap
    #[error(
        "no selection of at most {max_inputs} notes covers {requested} of asset {asset} (available {available})"
    )]
    NoViableSelection {
        asset: AssetId,
        requested: Amount,
        available: Amount,
        max_inputs: usize,
    },

    /// Recipients plus change exceed the circuit's output slots
    #[error("too many outputs: {requested} exceeds the circuit limit of {max}")]
    TooManyOutputs { requested: usize, max: usize },

    /// Persisted wallet state could not be read or is inconsistent
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl WalletError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        Self::Snapshot(e.to_string())
    }
}

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, WalletError>;
