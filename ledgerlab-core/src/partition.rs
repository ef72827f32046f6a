//! Partition Locator: year discovery and partition probing.
//!
//! Trades for one scenario live under
//! `{symbol}/{scenario}{suffix}/{year}/trades--{scenario}{suffix}___{symbol}0_p{index}.csv.lzo`.
//! Years are discovered by listing; indices are not listed but tried from 0
//! until the first missing object.

use crate::storage::{ObjectStore, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::io::Read;
use tracing::{info, warn};

/// Default suffix appended to a scenario name in the trades bucket.
pub const DEFAULT_SCENARIO_SUFFIX: &str = "___mw___wc=9";

/// Address of one partition object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionCoordinate {
    pub symbol: String,
    pub scenario: String,
    pub year: i32,
    pub index: u32,
}

/// Builds object keys for the trades bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTemplate {
    pub scenario_suffix: String,
}

impl Default for KeyTemplate {
    fn default() -> Self {
        Self {
            scenario_suffix: DEFAULT_SCENARIO_SUFFIX.to_string(),
        }
    }
}

impl KeyTemplate {
    pub fn new(scenario_suffix: impl Into<String>) -> Self {
        Self {
            scenario_suffix: scenario_suffix.into(),
        }
    }

    /// Scenario name as stored in the trades bucket.
    pub fn trade_scenario(&self, scenario: &str) -> String {
        format!("{scenario}{}", self.scenario_suffix)
    }

    /// Listing prefix whose common prefixes are the year directories.
    pub fn scenario_prefix(&self, symbol: &str, scenario: &str) -> String {
        format!("{symbol}/{}/", self.trade_scenario(scenario))
    }

    pub fn partition_key(&self, coord: &PartitionCoordinate) -> String {
        let s = self.trade_scenario(&coord.scenario);
        format!(
            "{symbol}/{s}/{year}/trades--{s}___{symbol}0_p{index}.csv.lzo",
            symbol = coord.symbol,
            year = coord.year,
            index = coord.index,
        )
    }
}

/// Why probing of one year ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStop {
    /// The next index did not exist.
    Exhausted,
    /// A storage error other than not-found.
    StorageFailure(String),
    /// The visitor rejected a partition.
    ConsumerFailure(String),
}

/// Result of probing one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearScan {
    pub year: i32,
    /// Partitions handed to the visitor successfully.
    pub partitions: u32,
    pub stop: ScanStop,
}

impl YearScan {
    pub fn is_clean(&self) -> bool {
        self.stop == ScanStop::Exhausted
    }
}

/// Finds and streams partition objects from the trades bucket.
pub struct PartitionLocator<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    template: KeyTemplate,
}

impl<'a> PartitionLocator<'a> {
    pub fn new(store: &'a dyn ObjectStore, bucket: impl Into<String>, template: KeyTemplate) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            template,
        }
    }

    /// Years present under the scenario prefix, ascending.
    pub fn list_years(&self, symbol: &str, scenario: &str) -> Result<BTreeSet<i32>, StorageError> {
        let prefix = self.template.scenario_prefix(symbol, scenario);
        let listing = self.store.list_all(&self.bucket, &prefix, Some("/"))?;

        let mut years = BTreeSet::new();
        for common in &listing.common_prefixes {
            let Some(segment) = common.split('/').filter(|s| !s.is_empty()).last() else {
                continue;
            };
            match segment.parse::<i32>() {
                Ok(year) => {
                    years.insert(year);
                }
                Err(_) => warn!(prefix = %common, "skipping non-numeric year directory"),
            }
        }
        info!(symbol, scenario, years = years.len(), "discovered trade years");
        Ok(years)
    }

    /// Fetch indices 0, 1, 2… of one year, handing each object to `visit`.
    ///
    /// A missing object ends the year normally. Any other storage error, or an
    /// error from `visit`, is logged and also ends the year.
    pub fn scan_year<F, E>(&self, symbol: &str, scenario: &str, year: i32, mut visit: F) -> YearScan
    where
        F: FnMut(&PartitionCoordinate, Box<dyn Read + Send>) -> Result<(), E>,
        E: Display,
    {
        let mut coord = PartitionCoordinate {
            symbol: symbol.to_string(),
            scenario: scenario.to_string(),
            year,
            index: 0,
        };
        let mut partitions = 0;

        let stop = loop {
            let key = self.template.partition_key(&coord);
            let reader = match self.store.get_object(&self.bucket, &key) {
                Ok(reader) => reader,
                Err(e) if e.is_not_found() => {
                    info!(year, index = coord.index, "no more partitions for year");
                    break ScanStop::Exhausted;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "storage failure, abandoning year");
                    break ScanStop::StorageFailure(e.to_string());
                }
            };

            if let Err(e) = visit(&coord, reader) {
                warn!(key = %key, error = %e, "partition processing failed, abandoning year");
                break ScanStop::ConsumerFailure(e.to_string());
            }
            partitions += 1;
            coord.index += 1;
        };

        YearScan {
            year,
            partitions,
            stop,
        }
    }

    /// Scan every discovered year in ascending order.
    ///
    /// If year discovery itself fails the error is logged and nothing is
    /// scanned.
    pub fn scan_all<F, E>(&self, symbol: &str, scenario: &str, mut visit: F) -> Vec<YearScan>
    where
        F: FnMut(&PartitionCoordinate, Box<dyn Read + Send>) -> Result<(), E>,
        E: Display,
    {
        let years = match self.list_years(symbol, scenario) {
            Ok(years) => years,
            Err(e) => {
                warn!(symbol, scenario, error = %e, "year discovery failed");
                return Vec::new();
            }
        };

        years
            .into_iter()
            .map(|year| self.scan_year(symbol, scenario, year, &mut visit))
            .collect()
    }
}
