//! Typed wallet parameters built from [`ShroudConfig`]

use shroud_config::ShroudConfig;
use shroud_privacy::{Amount, FieldElement, MAX_TREE_DEPTH};

use crate::error::{Result, WalletError};
use crate::ledger::ScanPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletParams {
    pub tree_depth: usize,
    pub zero_value: FieldElement,
    pub max_inputs: usize,
    pub max_outputs: usize,
    pub preferred_asset_notes: usize,
    pub merge_max_inputs: usize,
    pub relayer_fee: Amount,
    pub native_change_reserve: Amount,
    pub separate_native_change: bool,
    pub scan_policy: ScanPolicy,
    pub max_concurrency: usize,
}

impl WalletParams {
    pub fn from_config(config: &ShroudConfig) -> Result<Self> {
        let params = Self {
            tree_depth: config.tree.depth,
            zero_value: FieldElement::from_decimal(&config.tree.zero_value)?,
            max_inputs: config.circuit.max_inputs,
            max_outputs: config.circuit.max_outputs,
            preferred_asset_notes: config.circuit.preferred_asset_notes,
            merge_max_inputs: config.circuit.merge_max_inputs,
            relayer_fee: config.fees.relayer_fee.parse()?,
            native_change_reserve: config.fees.native_change_reserve.parse()?,
            separate_native_change: config.fees.separate_native_change,
            scan_policy: ScanPolicy {
                accept_app_notes: config.scan.accept_app_notes,
            },
            max_concurrency: config.scan.max_concurrency,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(WalletError::validation(format!(
                "tree depth must be in 1..={MAX_TREE_DEPTH}, got {}",
                self.tree_depth
            )));
        }
        if self.max_inputs == 0 || self.max_outputs == 0 {
            return Err(WalletError::validation(
                "circuit arity must allow at least one input and one output",
            ));
        }
        if self.preferred_asset_notes == 0 {
            return Err(WalletError::validation("preferred_asset_notes must be at least 1"));
        }
        if self.merge_max_inputs < 2 {
            return Err(WalletError::validation("merge_max_inputs must be at least 2"));
        }
        if self.max_concurrency == 0 {
            return Err(WalletError::validation("scan concurrency must be at least 1"));
        }
        Ok(())
    }
}

impl Default for WalletParams {
    fn default() -> Self {
        Self {
            tree_depth: shroud_config::DEFAULT_TREE_DEPTH,
            zero_value: FieldElement::ZERO,
            max_inputs: shroud_config::DEFAULT_MAX_INPUTS,
            max_outputs: shroud_config::DEFAULT_MAX_OUTPUTS,
            preferred_asset_notes: shroud_config::DEFAULT_PREFERRED_ASSET_NOTES,
            merge_max_inputs: shroud_config::DEFAULT_MERGE_MAX_INPUTS,
            relayer_fee: Amount::zero(),
            native_change_reserve: Amount::zero(),
            separate_native_change: false,
            scan_policy: ScanPolicy::default(),
            max_concurrency: shroud_config::DEFAULT_SCAN_CONCURRENCY,
        }
    }
}
