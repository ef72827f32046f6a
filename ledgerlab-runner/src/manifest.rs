//! Run manifest export (JSON).

use chrono::{DateTime, Utc};
use ledgerlab_core::Direction;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fetch::FetchCounts;
use crate::runner::RunError;

/// Current schema version of `manifest.json`.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationCounts {
    pub sources: usize,
    pub duplicates_removed: usize,
    pub rows_kept: usize,
    pub traders: usize,
    /// BLAKE3 hex digest of the aggregated scenario CSV.
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub files_processed: usize,
    pub files_skipped: usize,
    /// Ledgers that could not be created.
    #[serde(default)]
    pub outputs_failed: usize,
    pub lines_written: u64,
    pub lines_dropped: u64,
    pub sort_failures: usize,
}

/// Record of one scenario run, written next to its outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub scenario: String,
    pub direction: Direction,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when the scenario directory already existed and fetching was skipped.
    pub aggregation: Option<AggregationCounts>,
    pub fetch: Option<FetchCounts>,
    pub ledgers: LedgerCounts,
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), RunError> {
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a manifest, rejecting schema versions newer than this build.
pub fn read_manifest(path: &Path) -> Result<RunManifest, RunError> {
    let json = std::fs::read_to_string(path)?;
    let manifest: RunManifest = serde_json::from_str(&json)?;
    if manifest.schema_version > SCHEMA_VERSION {
        return Err(RunError::UnsupportedSchema {
            found: manifest.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(manifest)
}
