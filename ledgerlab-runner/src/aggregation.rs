//! Aggregation stage: summary objects → one deduplicated scenario CSV plus
//! its trader index.

use ledgerlab_core::aggregate::{concat_sources, dedup_rows, extract_trader_ids, group_by_scenario, strip_quotes};
use ledgerlab_core::ObjectStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{LedgerLayout, PipelineConfig};
use crate::runner::RunError;

/// What the aggregation stage produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationOutcome {
    pub scenario: String,
    /// Summary object keys that were concatenated, in order.
    pub sources: Vec<String>,
    pub duplicates_removed: usize,
    pub rows_kept: usize,
    pub trader_ids: BTreeSet<String>,
    /// BLAKE3 of the written scenario CSV.
    pub content_hash: Option<String>,
    pub output: Option<PathBuf>,
}

/// Build `<scenario>.csv` for one scenario from the summary bucket.
///
/// A scenario without any source objects yields an empty outcome and writes
/// nothing.
pub fn aggregate_scenario(
    store: &dyn ObjectStore,
    config: &PipelineConfig,
    symbol: &str,
    scenario: &str,
    layout: &LedgerLayout,
) -> Result<AggregationOutcome, RunError> {
    let prefix = format!("{symbol}/");
    let listing = store.list_all(&config.summary_bucket, &prefix, None)?;
    let csv_keys: Vec<&String> = listing.keys.iter().filter(|k| k.ends_with(".csv")).collect();
    info!(
        bucket = %config.summary_bucket,
        prefix = %prefix,
        found = csv_keys.len(),
        "listed summary objects"
    );

    let Some(group) = group_by_scenario(symbol, &csv_keys, Some(scenario))
        .into_iter()
        .next()
    else {
        warn!(symbol, scenario, "no summary objects for scenario");
        return Ok(AggregationOutcome {
            scenario: scenario.to_string(),
            ..AggregationOutcome::default()
        });
    };

    let mut sources = Vec::with_capacity(group.keys.len());
    for key in &group.keys {
        info!(key = %key, "downloading summary object");
        sources.push(store.get_string(&config.summary_bucket, key)?);
    }

    let aggregated = strip_quotes(&concat_sources(&sources));
    let dedup = dedup_rows(&aggregated, &config.dedup_columns);
    let trader_ids = extract_trader_ids(&dedup.content)?;

    let output = layout.aggregated_file();
    fs::write(&output, &dedup.content)?;
    let content_hash = blake3::hash(dedup.content.as_bytes()).to_hex().to_string();
    info!(
        scenario,
        path = %output.display(),
        traders = trader_ids.len(),
        "wrote aggregated scenario"
    );

    Ok(AggregationOutcome {
        scenario: scenario.to_string(),
        sources: group.keys,
        duplicates_removed: dedup.duplicates_removed,
        rows_kept: dedup.rows_kept,
        trader_ids,
        content_hash: Some(content_hash),
        output: Some(output),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlab_core::storage::InMemoryObjectStore;
    use std::path::Path;

    fn setup(dir: &Path) -> (PipelineConfig, LedgerLayout) {
        let config = PipelineConfig {
            output_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        };
        let layout = config.layout("ES", "s1");
        fs::create_dir_all(layout.scenario_dir()).unwrap();
        (config, layout)
    }

    #[test]
    fn concatenates_dedups_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        let store = InMemoryObjectStore::new();
        let bucket = &config.summary_bucket;
        store.insert(bucket, "ES/s1/a.csv", "\"traderId\",stop,limit\nt1,1,2\nt2,1,3\n");
        store.insert(bucket, "ES/s1/b.csv", "traderId,stop,limit\nt3,1,2\nt4,2,2");
        store.insert(bucket, "ES/s2/c.csv", "traderId,stop,limit\nt9,9,9\n");
        store.insert(bucket, "ES/s1/notes.txt", "ignored");

        let config = PipelineConfig {
            dedup_columns: vec!["stop".into(), "limit".into()],
            ..config
        };
        let outcome = aggregate_scenario(&store, &config, "ES", "s1", &layout).unwrap();
        assert_eq!(outcome.sources, vec!["ES/s1/a.csv", "ES/s1/b.csv"]);
        assert_eq!(outcome.duplicates_removed, 1);
        assert_eq!(outcome.rows_kept, 3);
        let ids: Vec<&str> = outcome.trader_ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["t1", "t2", "t4"]);

        let written = fs::read_to_string(layout.aggregated_file()).unwrap();
        assert_eq!(
            written,
            "\"traderId\",\"stop\",\"limit\"\nt1,1,2\nt2,1,3\nt4,2,2\n"
        );
        assert_eq!(
            outcome.content_hash.unwrap(),
            blake3::hash(written.as_bytes()).to_hex().to_string()
        );
    }

    #[test]
    fn unknown_scenario_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        let store = InMemoryObjectStore::new();
        let outcome = aggregate_scenario(&store, &config, "ES", "s1", &layout).unwrap();
        assert!(outcome.sources.is_empty());
        assert!(outcome.trader_ids.is_empty());
        assert!(!layout.aggregated_file().exists());
    }

    #[test]
    fn missing_trader_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (config, layout) = setup(dir.path());
        let store = InMemoryObjectStore::new();
        store.insert(&config.summary_bucket, "ES/s1/a.csv", "stop,limit\n1,2\n");
        let err = aggregate_scenario(&store, &config, "ES", "s1", &layout).unwrap_err();
        assert!(matches!(err, RunError::Codec(_)));
    }
}
