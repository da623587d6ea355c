//! Shroud Configuration
//!
//! Shared configuration crate for the Shroud wallet core.
//!
//! Handles loading configuration from:
//! 1. SHROUD_CONFIG env var (explicit path)
//! 2. ./shroud.toml (current directory)
//! 3. ~/.shroud/shroud.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "shroud.toml";
const CONFIG_DIR_NAME: &str = ".shroud";

// ============================================================================
// Default Constants
// ============================================================================

pub const DEFAULT_TREE_DEPTH: usize = 18;
/// Empty-leaf value of the deployed pool
pub const DEFAULT_ZERO_VALUE: &str =
    "14522046728041339886521211779101644712859239303505368468566383402165481390632";

pub const DEFAULT_MAX_INPUTS: usize = 2;
pub const DEFAULT_MAX_OUTPUTS: usize = 2;
pub const DEFAULT_PREFERRED_ASSET_NOTES: usize = 2;
pub const DEFAULT_MERGE_MAX_INPUTS: usize = 10;

pub const DEFAULT_RELAYER_FEE: &str = "100000";
pub const DEFAULT_NATIVE_CHANGE_RESERVE: &str = "0";

pub const DEFAULT_SCAN_CONCURRENCY: usize = 16;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShroudConfig {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Commitment tree shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_tree_depth")]
    pub depth: usize,
    /// Decimal field element filling empty leaves
    #[serde(default = "default_zero_value")]
    pub zero_value: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TREE_DEPTH,
            zero_value: DEFAULT_ZERO_VALUE.into(),
        }
    }
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}
fn default_zero_value() -> String {
    DEFAULT_ZERO_VALUE.into()
}

/// Arity of the proving circuits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    #[serde(default = "default_max_inputs")]
    pub max_inputs: usize,
    #[serde(default = "default_max_outputs")]
    pub max_outputs: usize,
    #[serde(default = "default_preferred_asset_notes")]
    pub preferred_asset_notes: usize,
    #[serde(default = "default_merge_max_inputs")]
    pub merge_max_inputs: usize,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            max_inputs: DEFAULT_MAX_INPUTS,
            max_outputs: DEFAULT_MAX_OUTPUTS,
            preferred_asset_notes: DEFAULT_PREFERRED_ASSET_NOTES,
            merge_max_inputs: DEFAULT_MERGE_MAX_INPUTS,
        }
    }
}

fn default_max_inputs() -> usize {
    DEFAULT_MAX_INPUTS
}
fn default_max_outputs() -> usize {
    DEFAULT_MAX_OUTPUTS
}
fn default_preferred_asset_notes() -> usize {
    DEFAULT_PREFERRED_ASSET_NOTES
}
fn default_merge_max_inputs() -> usize {
    DEFAULT_MERGE_MAX_INPUTS
}

/// Relayer fee and change policy, amounts as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_relayer_fee")]
    pub relayer_fee: String,
    #[serde(default = "default_native_change_reserve")]
    pub native_change_reserve: String,
    #[serde(default)]
    pub separate_native_change: bool,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            relayer_fee: DEFAULT_RELAYER_FEE.into(),
            native_change_reserve: DEFAULT_NATIVE_CHANGE_RESERVE.into(),
            separate_native_change: false,
        }
    }
}

fn default_relayer_fee() -> String {
    DEFAULT_RELAYER_FEE.into()
}
fn default_native_change_reserve() -> String {
    DEFAULT_NATIVE_CHANGE_RESERVE.into()
}

/// Payload scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub accept_app_notes: bool,
    #[serde(default = "default_scan_concurrency")]
    pub max_concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            accept_app_notes: false,
            max_concurrency: DEFAULT_SCAN_CONCURRENCY,
        }
    }
}

fn default_scan_concurrency() -> usize {
    DEFAULT_SCAN_CONCURRENCY
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Set field from env var if present
fn env_string(lookup: Lookup<'_>, key: &str, field: &mut String) {
    if let Some(v) = lookup(key) {
        *field = v;
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(lookup: Lookup<'_>, key: &str, field: &mut T) {
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(lookup: Lookup<'_>, key: &str) -> Option<bool> {
    lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl ShroudConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHROUD_CONFIG env var
        if let Ok(path) = env::var("SHROUD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("SHROUD_CONFIG points at missing file {}", path.display());
        }

        // 2. Check ./shroud.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shroud/shroud.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: Lookup<'_>) {
        // Tree
        env_parse(lookup, "SHROUD_TREE_DEPTH", &mut self.tree.depth);
        env_string(lookup, "SHROUD_ZERO_VALUE", &mut self.tree.zero_value);

        // Circuit
        env_parse(lookup, "SHROUD_MAX_INPUTS", &mut self.circuit.max_inputs);
        env_parse(lookup, "SHROUD_MAX_OUTPUTS", &mut self.circuit.max_outputs);

        // Fees
        env_string(lookup, "SHROUD_RELAYER_FEE", &mut self.fees.relayer_fee);
        if let Some(v) = env_bool(lookup, "SHROUD_SEPARATE_NATIVE_CHANGE") {
            self.fees.separate_native_change = v;
        }

        // Scan
        env_parse(lookup, "SHROUD_SCAN_CONCURRENCY", &mut self.scan.max_concurrency);
        if let Some(v) = env_bool(lookup, "SHROUD_ACCEPT_APP_NOTES") {
            self.scan.accept_app_notes = v;
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
