//! Pipeline configuration and on-disk layout.
//!
//! Everything a run needs is carried in [`PipelineConfig`]; nothing is read
//! from process-global state. The CLI layers flags and environment variables
//! on top of a TOML file.

use ledgerlab_core::aggregate::DEFAULT_DEDUP_COLUMNS;
use ledgerlab_core::partition::{KeyTemplate, DEFAULT_SCENARIO_SUFFIX};
use ledgerlab_core::storage::Compression;
use ledgerlab_core::TraderIdColumn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SUMMARY_BUCKET: &str = "mochi-prod-summary-graphs";
pub const DEFAULT_TRADES_BUCKET: &str = "mochi-trades";
pub const DEFAULT_EXTRACTS_BUCKET: &str = "mochi-trade-extracts";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bucket holding the per-scenario summary CSVs.
    pub summary_bucket: String,

    /// Bucket holding the partitioned raw trades.
    pub trades_bucket: String,

    /// Bucket receiving the per-scenario archives.
    pub extracts_bucket: String,

    /// Columns forming the dedup key, in key order.
    pub dedup_columns: Vec<String>,

    /// Appended to the scenario name in trades-bucket keys.
    pub scenario_suffix: String,

    /// Raw trade layout of the partition objects.
    pub trader_id_column: TraderIdColumn,

    /// Codec of the partition objects.
    pub decompression: Compression,

    /// Root of the local output tree.
    pub output_dir: PathBuf,

    /// Root of the directory-backed object store.
    pub store_root: PathBuf,

    /// Upload scenario archives after the ledgers are built.
    pub export: bool,

    /// Sort profit ledgers chronologically.
    pub sort_profit_ledgers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_bucket: DEFAULT_SUMMARY_BUCKET.to_string(),
            trades_bucket: DEFAULT_TRADES_BUCKET.to_string(),
            extracts_bucket: DEFAULT_EXTRACTS_BUCKET.to_string(),
            dedup_columns: DEFAULT_DEDUP_COLUMNS.iter().map(|c| c.to_string()).collect(),
            scenario_suffix: DEFAULT_SCENARIO_SUFFIX.to_string(),
            trader_id_column: TraderIdColumn::default(),
            decompression: Compression::default(),
            output_dir: PathBuf::from("output"),
            store_root: PathBuf::from("store"),
            export: true,
            sort_profit_ledgers: false,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string. Missing keys take
    /// their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("summary_bucket", &self.summary_bucket),
            ("trades_bucket", &self.trades_bucket),
            ("extracts_bucket", &self.extracts_bucket),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        if self.dedup_columns.is_empty() {
            return Err(ConfigError::Invalid(
                "dedup_columns must name at least one column".into(),
            ));
        }
        if self.scenario_suffix.contains('/') {
            return Err(ConfigError::Invalid(
                "scenario_suffix must not contain '/'".into(),
            ));
        }
        Ok(())
    }

    pub fn key_template(&self) -> KeyTemplate {
        KeyTemplate::new(self.scenario_suffix.clone())
    }

    pub fn layout(&self, symbol: &str, scenario: &str) -> LedgerLayout {
        LedgerLayout::new(&self.output_dir, symbol, scenario)
    }
}

/// Paths of one scenario's output tree:
///
/// ```text
/// {output_dir}/{symbol}/{scenario}/
///     {scenario}.csv          aggregated, deduplicated summary
///     raw/{traderId}.csv      routed raw trades
///     formatted-trades/       per-trader ledgers
///     profits/                profit-mode ledgers
///     manifest.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLayout {
    symbol_dir: PathBuf,
    scenario: String,
}

impl LedgerLayout {
    pub fn new(output_dir: &Path, symbol: &str, scenario: &str) -> Self {
        Self {
            symbol_dir: output_dir.join(symbol),
            scenario: scenario.to_string(),
        }
    }

    pub fn symbol_dir(&self) -> &Path {
        &self.symbol_dir
    }

    pub fn scenario_dir(&self) -> PathBuf {
        self.symbol_dir.join(&self.scenario)
    }

    pub fn aggregated_file(&self) -> PathBuf {
        self.scenario_dir().join(format!("{}.csv", self.scenario))
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.scenario_dir().join("raw")
    }

    pub fn formatted_dir(&self) -> PathBuf {
        self.scenario_dir().join("formatted-trades")
    }

    pub fn profits_dir(&self) -> PathBuf {
        self.scenario_dir().join("profits")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.scenario_dir().join("manifest.json")
    }
}
