//! Per-trader profit ledgers.
//!
//! A ledger is a CSV file with [`LEDGER_HEADER`](crate::codec::LEDGER_HEADER)
//! and one row per trade: placement time, prices, tick profit, running total,
//! and final state. [`builder`] produces ledgers in arrival order; [`sorter`]
//! reorders them chronologically and recomputes the running total.

pub mod builder;
pub mod sorter;

pub use builder::{BuildSummary, LedgerBuilder, LineResult, TradeLine};
pub use sorter::{sort_ledger_dir, sort_ledger_file, sort_lines, SortOutcome, SortSummary};

use crate::codec::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Lines carrying this marker in any field are end-of-stream sentinels.
pub const POISON_MARKER: &str = "POISON";

/// Timestamp layout used in ledger rows.
pub const LEDGER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sign applied to `exit - filled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// Short if the name mentions `short`, long otherwise.
    pub fn from_name(name: &str) -> Self {
        if name.contains("short") {
            Direction::Short
        } else {
            Direction::Long
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One formatted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Already formatted with [`LEDGER_TIME_FORMAT`].
    pub placed_at: String,
    pub filled_price: i64,
    pub exit_price: i64,
    pub tick_profit: i64,
    pub running_total: i64,
    pub state: String,
}

impl LedgerEntry {
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.placed_at,
            self.filled_price,
            self.exit_price,
            self.tick_profit,
            self.running_total,
            self.state
        )
    }
}

/// Tick profit of one trade; `None` on overflow.
pub fn tick_profit(filled: i64, exit: i64, direction: Direction) -> Option<i64> {
    exit.checked_sub(filled)?.checked_mul(direction.sign())
}

/// A line that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable line '{line}': {reason}")]
pub struct ParseFailure {
    pub line: String,
    pub reason: String,
}

impl ParseFailure {
    pub fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Per-line parse result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    Ok(T),
    /// Blank or sentinel line; nothing to do.
    Skip,
    /// Unusable line; logged and dropped by callers.
    Fatal(ParseFailure),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("ledger I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Parse(#[from] ParseFailure),
}
