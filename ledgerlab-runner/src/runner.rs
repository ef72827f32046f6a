//! Scenario runner: wires aggregation, fetch, ledgers, manifest, and export.
//!
//! One call handles one (symbol, scenario). When the scenario directory
//! already exists the upstream stages are skipped and the ledgers are rebuilt
//! from the raw files already on disk.

use chrono::Utc;
use ledgerlab_core::ledger::{LedgerError, ParseFailure};
use ledgerlab_core::router::RouterError;
use ledgerlab_core::storage::{Archiver, Decompressor, LocalObjectStore, ZipArchiver};
use ledgerlab_core::{CodecError, Direction, ObjectStore, StorageError};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::aggregation::{aggregate_scenario, AggregationOutcome};
use crate::config::PipelineConfig;
use crate::export::{export_symbol, ExportSummary};
use crate::fetch::{fetch_trades, FetchCounts, FetchSummary};
use crate::ledgers::{build_formatted_ledgers, LedgerSummary};
use crate::manifest::{write_manifest, AggregationCounts, LedgerCounts, RunManifest, SCHEMA_VERSION};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to create {path}: {source}")]
    Setup { path: PathBuf, source: io::Error },

    #[error("raw directory does not exist: {0}")]
    MissingRawDir(PathBuf),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] ParseFailure),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("unsupported manifest schema version {found} (max supported: {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

impl From<RouterError> for RunError {
    fn from(e: RouterError) -> Self {
        match e {
            RouterError::Codec(e) => RunError::Codec(e),
            RouterError::Io(e) => RunError::Io(e),
        }
    }
}

impl From<LedgerError> for RunError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Codec(e) => RunError::Codec(e),
            LedgerError::Io(e) => RunError::Io(e),
            LedgerError::Parse(e) => RunError::Parse(e),
        }
    }
}

/// Collaborators and settings shared by every run.
pub struct RunContext {
    pub config: PipelineConfig,
    pub store: Arc<dyn ObjectStore>,
    pub decompressor: Box<dyn Decompressor>,
    pub archiver: Box<dyn Archiver>,
}

impl RunContext {
    /// Context over an arbitrary store, with the configured codec and zip
    /// archives.
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectStore>) -> Self {
        let decompressor = config.decompression.decompressor();
        Self {
            config,
            store,
            decompressor,
            archiver: Box::new(ZipArchiver),
        }
    }

    /// Context over the directory-backed store at `config.store_root`.
    pub fn local(config: PipelineConfig) -> Self {
        let store = Arc::new(LocalObjectStore::new(config.store_root.clone()));
        Self::new(config, store)
    }
}

/// Everything one run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub symbol: String,
    pub scenario: String,
    pub direction: Direction,
    /// `None` when the scenario directory already existed.
    pub aggregation: Option<AggregationOutcome>,
    pub fetch: Option<FetchSummary>,
    pub ledgers: LedgerSummary,
    /// `None` when export is disabled or the symbol directory could not be read.
    pub export: Option<ExportSummary>,
    pub manifest_path: PathBuf,
}

/// Run the full pipeline for one scenario.
pub fn run_scenario(ctx: &RunContext, symbol: &str, scenario: &str) -> Result<RunReport, RunError> {
    let started_at = Utc::now();
    let config = &ctx.config;
    let layout = config.layout(symbol, scenario);
    let direction = Direction::from_name(scenario);
    let scenario_dir = layout.scenario_dir();
    let raw_dir = layout.raw_dir();

    let mut aggregation = None;
    let mut fetch = None;
    if !scenario_dir.exists() {
        for dir in [&scenario_dir, &raw_dir] {
            fs::create_dir_all(dir).map_err(|source| RunError::Setup {
                path: dir.clone(),
                source,
            })?;
        }
        info!(dir = %scenario_dir.display(), "created scenario directory");

        let outcome = aggregate_scenario(ctx.store.as_ref(), config, symbol, scenario, &layout)?;
        let summary = fetch_trades(
            ctx.store.as_ref(),
            ctx.decompressor.as_ref(),
            config,
            symbol,
            scenario,
            &outcome.trader_ids,
            &raw_dir,
        )?;
        aggregation = Some(outcome);
        fetch = Some(summary);
    } else {
        info!(dir = %scenario_dir.display(), "scenario directory exists, skipping fetch");
    }

    if !raw_dir.is_dir() {
        return Err(RunError::MissingRawDir(raw_dir));
    }

    let ledgers = build_formatted_ledgers(
        &raw_dir,
        &layout.formatted_dir(),
        direction,
        config.trader_id_column,
    )?;

    let manifest = RunManifest {
        schema_version: SCHEMA_VERSION,
        symbol: symbol.to_string(),
        scenario: scenario.to_string(),
        direction,
        started_at,
        finished_at: Utc::now(),
        aggregation: aggregation.as_ref().map(|a| AggregationCounts {
            sources: a.sources.len(),
            duplicates_removed: a.duplicates_removed,
            rows_kept: a.rows_kept,
            traders: a.trader_ids.len(),
            content_hash: a.content_hash.clone(),
        }),
        fetch: fetch.as_ref().map(FetchCounts::from),
        ledgers: LedgerCounts {
            files_processed: ledgers.files_processed,
            files_skipped: ledgers.files_skipped.len(),
            outputs_failed: ledgers.outputs_failed.len(),
            lines_written: ledgers.build.lines_written,
            lines_dropped: ledgers.build.lines_dropped,
            sort_failures: ledgers.sort.as_ref().map_or(0, |s| s.failed.len()),
        },
    };
    let manifest_path = layout.manifest_file();
    write_manifest(&manifest_path, &manifest)?;

    let export = if config.export {
        match export_symbol(
            ctx.store.as_ref(),
            ctx.archiver.as_ref(),
            &config.extracts_bucket,
            layout.symbol_dir(),
        ) {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(symbol, error = %format!("{e:#}"), "export failed");
                None
            }
        }
    } else {
        None
    };

    info!(symbol, scenario, %direction, "scenario run complete");
    Ok(RunReport {
        symbol: symbol.to_string(),
        scenario: scenario.to_string(),
        direction,
        aggregation,
        fetch,
        ledgers,
        export,
        manifest_path,
    })
}
