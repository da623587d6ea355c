//! Persisted wallet state
//!
//! JSON with two sections: the mirrored tree with every level and the
//! ledger maps per asset. Loading recomputes no hash.

use serde::{Deserialize, Serialize};

use shroud_privacy::TreeSnapshot;

use crate::error::{Result, WalletError};
use crate::ledger::Balance;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub version: u32,
    pub tree: TreeSnapshot,
    pub balance: Balance,
}

impl WalletSnapshot {
    pub fn new(tree: TreeSnapshot, balance: Balance) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tree,
            balance,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(WalletError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}
