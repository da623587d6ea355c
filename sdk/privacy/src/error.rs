//! Error definitions for the privacy primitives.
use thiserror::Error;

/// Errors raised by notes, the commitment tree and note cryptography
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrivacyError {
    /// Malformed input (mismatched arrays, out-of-range amounts, bad asset layout)
    #[error("validation error: {0}")]
    Validation(String),

    /// The commitment tree has no free leaf slots left
    #[error("tree capacity exceeded: capacity {capacity}, requested {requested}")]
    CapacityExceeded { capacity: u64, requested: u64 },

    /// A leaf index outside the populated part of the tree
    #[error("leaf index {index} out of range (tree holds {len} leaves)")]
    IndexOutOfRange { index: u64, len: u64 },

    /// The payload decrypted for this account but could not be decoded
    #[error("malformed note payload: {0}")]
    MalformedPayload(String),

    /// The payload decrypted for this account but describes a different leaf
    #[error("decrypted note does not match commitment {expected}")]
    CommitmentMismatch { expected: String },

    /// AEAD sealing failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Persisted tree state is inconsistent with its own header
    #[error("inconsistent snapshot: {0}")]
    Snapshot(String),
}

impl PrivacyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type for privacy operations
pub type Result<T> = std::result::Result<T, PrivacyError>;
