//! LedgerLab Runner: scenario pipeline orchestration.
//!
//! This crate builds on `ledgerlab-core` to provide:
//! - Pipeline configuration (TOML) and the per-scenario output layout
//! - Aggregation of summary objects into a deduplicated scenario CSV
//! - Partition fetch and per-trader routing of raw trades
//! - Formatted and profit-mode ledger construction
//! - Run manifests, scenario archive export, and drawdown analysis

pub mod aggregation;
pub mod config;
pub mod drawdown;
pub mod export;
pub mod fetch;
pub mod ledgers;
pub mod manifest;
pub mod runner;

pub use aggregation::{aggregate_scenario, AggregationOutcome};
pub use config::{ConfigError, LedgerLayout, PipelineConfig};
pub use drawdown::{analyze_trader, write_timeline, DrawdownPoint, DrawdownReport};
pub use export::{export_symbol, ExportSummary};
pub use fetch::{fetch_trades, FetchSummary};
pub use ledgers::{build_formatted_ledgers, build_profit_ledgers, LedgerSummary};
pub use manifest::{read_manifest, write_manifest, RunManifest, SCHEMA_VERSION};
pub use runner::{run_scenario, RunContext, RunError, RunReport};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn reports_are_send_sync() {
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
        assert_send::<DrawdownReport>();
        assert_sync::<DrawdownReport>();
        assert_send::<RunManifest>();
        assert_sync::<RunManifest>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
    }

    #[test]
    fn context_is_send_sync() {
        assert_send::<RunContext>();
        assert_sync::<RunContext>();
    }
}
