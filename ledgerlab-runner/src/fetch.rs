//! Trade fetch stage: stream every partition of a scenario through the
//! router into `raw/<traderId>.csv`.

use ledgerlab_core::partition::{PartitionLocator, YearScan};
use ledgerlab_core::router::{ensure_headers, HeaderPass, RouteSummary, TradeRouter};
use ledgerlab_core::storage::Decompressor;
use ledgerlab_core::{CodecError, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::runner::RunError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub years: Vec<YearScan>,
    pub route: RouteSummary,
    pub headers: HeaderPass,
}

impl FetchSummary {
    pub fn partitions(&self) -> u32 {
        self.years.iter().map(|y| y.partitions).sum()
    }

    /// Years whose scan ended on an error rather than a missing partition.
    pub fn incomplete_years(&self) -> Vec<i32> {
        self.years
            .iter()
            .filter(|y| !y.is_clean())
            .map(|y| y.year)
            .collect()
    }
}

/// Counters persisted in the run manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCounts {
    pub years: Vec<i32>,
    pub incomplete_years: Vec<i32>,
    pub partitions: u32,
    pub lines_read: u64,
    pub lines_matched: u64,
    pub write_failures: Vec<String>,
}

impl From<&FetchSummary> for FetchCounts {
    fn from(summary: &FetchSummary) -> Self {
        Self {
            years: summary.years.iter().map(|y| y.year).collect(),
            incomplete_years: summary.incomplete_years(),
            partitions: summary.partitions(),
            lines_read: summary.route.lines_read,
            lines_matched: summary.route.lines_matched,
            write_failures: summary.route.write_failures.clone(),
        }
    }
}

/// Fetch and route every partition of `scenario`.
///
/// Each partition is first copied to a scoped temp file, then decoded and
/// routed; the temp file is removed whether routing succeeds or not. A failed
/// partition abandons its year, except that a header mismatch on the very
/// first partition aborts the fetch. After all years, every raw file gets the
/// raw trade header.
pub fn fetch_trades(
    store: &dyn ObjectStore,
    decompressor: &dyn Decompressor,
    config: &PipelineConfig,
    symbol: &str,
    scenario: &str,
    trader_ids: &BTreeSet<String>,
    raw_dir: &Path,
) -> Result<FetchSummary, RunError> {
    let mut summary = FetchSummary::default();
    if trader_ids.is_empty() {
        warn!(symbol, scenario, "no trader ids, skipping trade fetch");
        return Ok(summary);
    }

    let router = TradeRouter::new(trader_ids.clone(), raw_dir, config.trader_id_column);
    let locator = PartitionLocator::new(store, config.trades_bucket.clone(), config.key_template());
    let mut route_total = RouteSummary::default();

    let years = locator.list_years(symbol, scenario).unwrap_or_else(|e| {
        warn!(symbol, scenario, error = %e, "year discovery failed");
        BTreeSet::new()
    });
    let mut first_partition = true;
    let mut fatal: Option<CodecError> = None;
    for year in years {
        let scan = locator.scan_year(symbol, scenario, year, |coord, reader| {
            debug!(year = coord.year, index = coord.index, "routing partition");
            let first = std::mem::take(&mut first_partition);
            match route_partition(&router, decompressor, reader) {
                Ok(routed) => {
                    route_total.absorb(routed);
                    Ok(())
                }
                Err(RunError::Codec(e)) if first => {
                    fatal = Some(e.clone());
                    Err(RunError::Codec(e))
                }
                Err(e) => Err(e),
            }
        });
        summary.years.push(scan);
        if let Some(e) = fatal.take() {
            error!(symbol, scenario, year, error = %e, "first partition has the wrong header, aborting fetch");
            return Err(RunError::Codec(e));
        }
    }
    summary.route = route_total;

    summary.headers = ensure_headers(raw_dir, config.trader_id_column.raw_header())?;
    info!(
        symbol,
        scenario,
        partitions = summary.partitions(),
        matched = summary.route.lines_matched,
        "trade fetch complete"
    );
    Ok(summary)
}

fn route_partition(
    router: &TradeRouter,
    decompressor: &dyn Decompressor,
    mut reader: Box<dyn Read + Send>,
) -> Result<RouteSummary, RunError> {
    let mut tmp = tempfile::NamedTempFile::new()?;
    io::copy(&mut reader, &mut tmp)?;
    let decoded = decompressor.decode(Box::new(tmp.reopen()?));
    Ok(router.route(BufReader::new(decoded))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlab_core::codec::RAW_TRADE_HEADER;
    use ledgerlab_core::partition::PartitionCoordinate;
    use ledgerlab_core::storage::{InMemoryObjectStore, Passthrough};
    use std::fs;

    fn put_partition(store: &InMemoryObjectStore, config: &PipelineConfig, year: i32, index: u32, rows: &[&str]) {
        let key = config.key_template().partition_key(&PartitionCoordinate {
            symbol: "ES".into(),
            scenario: "s1".into(),
            year,
            index,
        });
        let mut body = format!("{RAW_TRADE_HEADER}\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        store.insert(&config.trades_bucket, &key, body);
    }

    #[test]
    fn routes_all_years_and_adds_headers() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default();
        let store = InMemoryObjectStore::new();
        put_partition(&store, &config, 2019, 0, &["1,t1,a"]);
        put_partition(&store, &config, 2019, 1, &["2,t2,b", "3,t1,c"]);
        put_partition(&store, &config, 2020, 0, &["4,t1,d", "5,zz,e"]);

        let ids: BTreeSet<String> = ["t1", "t2"].iter().map(|s| s.to_string()).collect();
        let summary = fetch_trades(&store, &Passthrough, &config, "ES", "s1", &ids, dir.path()).unwrap();

        assert_eq!(summary.partitions(), 3);
        assert!(summary.incomplete_years().is_empty());
        assert_eq!(summary.route.lines_read, 5);
        assert_eq!(summary.route.lines_matched, 4);
        assert_eq!(summary.headers.inserted, 2);

        let t1 = fs::read_to_string(dir.path().join("t1.csv")).unwrap();
        assert_eq!(t1, format!("{RAW_TRADE_HEADER}\n1,t1,a\n3,t1,c\n4,t1,d\n"));
    }

    #[test]
    fn bad_partition_header_abandons_year() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default();
        let store = InMemoryObjectStore::new();
        put_partition(&store, &config, 2019, 0, &["1,t1,a"]);
        let bad = config.key_template().partition_key(&PartitionCoordinate {
            symbol: "ES".into(),
            scenario: "s1".into(),
            year: 2019,
            index: 1,
        });
        store.insert(&config.trades_bucket, &bad, "nope,nope\n");
        put_partition(&store, &config, 2019, 2, &["2,t1,b"]);

        let ids: BTreeSet<String> = ["t1".to_string()].into_iter().collect();
        let summary = fetch_trades(&store, &Passthrough, &config, "ES", "s1", &ids, dir.path()).unwrap();
        assert_eq!(summary.partitions(), 1);
        assert_eq!(summary.incomplete_years(), vec![2019]);
    }

    #[test]
    fn wrong_header_on_first_partition_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default();
        let store = InMemoryObjectStore::new();
        let first = config.key_template().partition_key(&PartitionCoordinate {
            symbol: "ES".into(),
            scenario: "s1".into(),
            year: 2019,
            index: 0,
        });
        store.insert(&config.trades_bucket, &first, "nope,nope\n1,t1,a\n");
        put_partition(&store, &config, 2019, 1, &["2,t1,b"]);
        put_partition(&store, &config, 2020, 0, &["3,t1,c"]);

        let ids: BTreeSet<String> = ["t1".to_string()].into_iter().collect();
        let err = fetch_trades(&store, &Passthrough, &config, "ES", "s1", &ids, dir.path()).unwrap_err();
        assert!(matches!(err, RunError::Codec(CodecError::HeaderMismatch { .. })));
        assert!(!dir.path().join("t1.csv").exists());
    }

    #[test]
    fn empty_index_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        let summary = fetch_trades(
            &store,
            &Passthrough,
            &PipelineConfig::default(),
            "ES",
            "s1",
            &BTreeSet::new(),
            dir.path(),
        )
        .unwrap();
        assert_eq!(summary, FetchSummary::default());
    }
}
