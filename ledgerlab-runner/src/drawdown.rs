//! Drawdown analysis of one trader across partition data files.
//!
//! Walks the trader's trades in partition order, tracking cumulative profit
//! against its running peak and trough. Each time the maximum drawdown or
//! maximum melt-up grows, one timeline point is recorded.

use anyhow::{Context, Result};
use chrono::DateTime;
use ledgerlab_core::codec::{split_fields, validate_header, HeaderMap, TraderIdColumn};
use ledgerlab_core::ledger::{tick_profit, Direction, LEDGER_TIME_FORMAT};
use ledgerlab_core::storage::Decompressor;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ledgers::order_by_partition;

/// Timeline row, written as `PlaceDateTime,MaxDrawdown,MaxMeltUp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawdownPoint {
    #[serde(rename = "PlaceDateTime")]
    pub placed_at: String,
    #[serde(rename = "MaxDrawdown")]
    pub max_drawdown: i64,
    #[serde(rename = "MaxMeltUp")]
    pub max_melt_up: i64,
}

/// Running statistics for one trader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawdownReport {
    pub trader_id: String,
    pub trades: u64,
    pub cumulative_profit: i64,
    pub peak: i64,
    pub trough: i64,
    /// Largest fall from a peak, in ticks.
    pub max_drawdown: i64,
    /// Largest rise from a trough, in ticks.
    pub max_melt_up: i64,
    pub wins: u64,
    pub losses: u64,
    pub max_consecutive_wins: u64,
    pub max_consecutive_losses: u64,
    pub max_consecutive_stopped: u64,
    pub max_consecutive_limit: u64,
    pub timeline: Vec<DrawdownPoint>,

    #[serde(skip)]
    consecutive_wins: u64,
    #[serde(skip)]
    consecutive_losses: u64,
    #[serde(skip)]
    consecutive_stopped: u64,
    #[serde(skip)]
    consecutive_limit: u64,
}

impl DrawdownReport {
    pub fn new(trader_id: impl Into<String>) -> Self {
        Self {
            trader_id: trader_id.into(),
            ..Self::default()
        }
    }

    /// Fold one trade into the statistics.
    pub fn record(&mut self, placed_at: &str, tick: i64, state: &str) {
        self.trades += 1;
        self.cumulative_profit = self.cumulative_profit.saturating_add(tick);
        self.peak = self.peak.max(self.cumulative_profit);
        self.trough = self.trough.min(self.cumulative_profit);

        let drawdown = self.peak.saturating_sub(self.cumulative_profit);
        let melt_up = self.cumulative_profit.saturating_sub(self.trough);
        let mut changed = false;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
            changed = true;
        }
        if melt_up > self.max_melt_up {
            self.max_melt_up = melt_up;
            changed = true;
        }
        if changed {
            self.timeline.push(DrawdownPoint {
                placed_at: placed_at.to_string(),
                max_drawdown: self.max_drawdown,
                max_melt_up: self.max_melt_up,
            });
        }

        if tick > 0 {
            self.wins += 1;
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.losses += 1;
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }
        self.max_consecutive_wins = self.max_consecutive_wins.max(self.consecutive_wins);
        self.max_consecutive_losses = self.max_consecutive_losses.max(self.consecutive_losses);

        match state {
            "STOPPED" => {
                self.consecutive_stopped += 1;
                self.max_consecutive_stopped = self.max_consecutive_stopped.max(self.consecutive_stopped);
            }
            "LIMIT" => {
                self.consecutive_limit += 1;
                self.max_consecutive_limit = self.max_consecutive_limit.max(self.consecutive_limit);
            }
            _ => {
                self.consecutive_stopped = 0;
                self.consecutive_limit = 0;
            }
        }
    }
}

/// Analyse `trader_id` over `files`, read in partition-index order.
///
/// Files whose header does not match the layout, and lines that do not
/// parse, are skipped with a warning.
pub fn analyze_trader(
    trader_id: &str,
    files: &[PathBuf],
    decompressor: &dyn Decompressor,
    column: TraderIdColumn,
    direction: Direction,
) -> Result<DrawdownReport> {
    let header = HeaderMap::parse(column.raw_header());
    let idx = |name: &str| header.index_of(name);
    let (trader_idx, placed_idx, state_idx, filled_idx, exit_idx) = (
        idx("traderId")?,
        idx("placedDateTime")?,
        idx("state")?,
        idx("filledPrice")?,
        idx("exitPrice")?,
    );

    let mut report = DrawdownReport::new(trader_id);
    for path in order_by_partition(files) {
        info!(file = %path.display(), "scanning data file");
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let mut lines = BufReader::new(decompressor.decode(Box::new(file))).lines();

        let first = lines.next().transpose()?.unwrap_or_default();
        if let Err(e) = validate_header(&first, column.raw_header()) {
            warn!(file = %path.display(), error = %e, "skipping data file");
            continue;
        }

        for line in lines {
            let line = line?;
            let fields = split_fields(&line);
            if fields.get(trader_idx).map(|f| f.trim()) != Some(trader_id) {
                continue;
            }
            let parsed = (|| {
                let int = |i: usize| fields.get(i)?.trim().parse::<i64>().ok();
                let placed = DateTime::from_timestamp(int(placed_idx)?, 0)?;
                Some((
                    placed.format(LEDGER_TIME_FORMAT).to_string(),
                    tick_profit(int(filled_idx)?, int(exit_idx)?, direction)?,
                    fields.get(state_idx)?.trim(),
                ))
            })();
            match parsed {
                Some((placed_at, tick, state)) => report.record(&placed_at, tick, state),
                None => warn!(line = %line, "skipping unparseable trade line"),
            }
        }
    }

    info!(
        trader_id,
        trades = report.trades,
        max_drawdown = report.max_drawdown,
        max_melt_up = report.max_melt_up,
        wins = report.wins,
        losses = report.losses,
        max_consecutive_stopped = report.max_consecutive_stopped,
        max_consecutive_limit = report.max_consecutive_limit,
        "drawdown analysis complete"
    );
    Ok(report)
}

/// Write the timeline as CSV.
pub fn write_timeline(report: &DrawdownReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    if report.timeline.is_empty() {
        writer.write_record(["PlaceDateTime", "MaxDrawdown", "MaxMeltUp"])?;
    }
    for point in &report.timeline {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}
