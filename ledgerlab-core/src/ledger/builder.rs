//! Ledger Builder: turns raw trade lines into formatted ledger rows, one
//! output sink per trader.

use super::{
    tick_profit, Direction, LedgerEntry, LedgerError, ParseFailure, ParseOutcome,
    LEDGER_TIME_FORMAT, POISON_MARKER,
};
use crate::codec::{split_fields, HeaderMap, LEDGER_HEADER};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::io::{self, Write};
use tracing::{error, info, warn};

/// Fields the builder needs from one raw trade line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeLine {
    pub trader_id: String,
    /// Epoch seconds, UTC.
    pub placed_at: i64,
    pub filled_price: i64,
    pub exit_price: i64,
    pub state: String,
}

/// What happened to one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineResult {
    Written,
    /// Trader has no sink.
    Ignored,
    /// Blank or sentinel line.
    Skipped,
    /// Unparseable line.
    Dropped,
    /// The trader's sink failed, now or earlier.
    WriteFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub lines_written: u64,
    pub lines_ignored: u64,
    pub lines_skipped: u64,
    pub lines_dropped: u64,
    /// Final running total per trader.
    pub totals: BTreeMap<String, i64>,
    pub write_failures: Vec<String>,
}

struct Sink<W> {
    writer: W,
    running_total: i64,
    failed: bool,
}

/// Column positions resolved once from the raw header.
#[derive(Debug, Clone, Copy)]
struct Columns {
    trader_id: usize,
    exit_price: usize,
    filled_price: usize,
    state: usize,
    placed_at: usize,
}

impl Columns {
    fn max(&self) -> usize {
        [
            self.trader_id,
            self.exit_price,
            self.filled_price,
            self.state,
            self.placed_at,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

pub struct LedgerBuilder<W: Write> {
    columns: Columns,
    direction: Direction,
    sinks: BTreeMap<String, Sink<W>>,
    summary: BuildSummary,
}

impl<W: Write> LedgerBuilder<W> {
    /// Resolve the required trade columns. Lookups are case-sensitive.
    pub fn new(header: &HeaderMap, direction: Direction) -> Result<Self, LedgerError> {
        let columns = Columns {
            trader_id: header.index_of("traderId")?,
            exit_price: header.index_of("exitPrice")?,
            filled_price: header.index_of("filledPrice")?,
            state: header.index_of("state")?,
            placed_at: header.index_of("placedDateTime")?,
        };
        Ok(Self {
            columns,
            direction,
            sinks: BTreeMap::new(),
            summary: BuildSummary::default(),
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Register the output for a trader and write the ledger header to it.
    pub fn add_sink(&mut self, trader_id: impl Into<String>, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{LEDGER_HEADER}")?;
        self.sinks.insert(
            trader_id.into(),
            Sink {
                writer,
                running_total: 0,
                failed: false,
            },
        );
        Ok(())
    }

    /// Interpret one raw line without touching any sink.
    pub fn parse_line(&self, line: &str) -> ParseOutcome<TradeLine> {
        if line.trim().is_empty() {
            return ParseOutcome::Skip;
        }
        if line.contains(POISON_MARKER) {
            return ParseOutcome::Skip;
        }
        let fields = split_fields(line);
        if fields.len() <= self.columns.max() {
            return ParseOutcome::Fatal(ParseFailure::new(
                line,
                format!("expected at least {} fields, found {}", self.columns.max() + 1, fields.len()),
            ));
        }

        let int = |idx: usize, name: &str| -> Result<i64, ParseFailure> {
            fields[idx]
                .trim()
                .parse::<i64>()
                .map_err(|e| ParseFailure::new(line, format!("{name}: {e}")))
        };
        let parsed = (|| {
            Ok::<_, ParseFailure>(TradeLine {
                trader_id: fields[self.columns.trader_id].trim().to_string(),
                placed_at: int(self.columns.placed_at, "placedDateTime")?,
                filled_price: int(self.columns.filled_price, "filledPrice")?,
                exit_price: int(self.columns.exit_price, "exitPrice")?,
                state: fields[self.columns.state].trim().to_string(),
            })
        })();

        match parsed {
            Ok(trade) if DateTime::from_timestamp(trade.placed_at, 0).is_none() => {
                ParseOutcome::Fatal(ParseFailure::new(line, "placedDateTime out of range"))
            }
            Ok(trade) if tick_profit(trade.filled_price, trade.exit_price, self.direction).is_none() => {
                ParseOutcome::Fatal(ParseFailure::new(line, "profit overflow"))
            }
            Ok(trade) => ParseOutcome::Ok(trade),
            Err(failure) => ParseOutcome::Fatal(failure),
        }
    }

    /// Parse a line and append its ledger row to the trader's sink.
    pub fn process_line(&mut self, line: &str) -> LineResult {
        let trade = match self.parse_line(line) {
            ParseOutcome::Ok(trade) => trade,
            ParseOutcome::Skip => {
                self.summary.lines_skipped += 1;
                return LineResult::Skipped;
            }
            ParseOutcome::Fatal(failure) => {
                error!(line = %failure.line, reason = %failure.reason, "dropping unparseable trade line");
                self.summary.lines_dropped += 1;
                return LineResult::Dropped;
            }
        };

        let direction = self.direction;
        let Some(sink) = self.sinks.get_mut(&trade.trader_id) else {
            self.summary.lines_ignored += 1;
            return LineResult::Ignored;
        };
        if sink.failed {
            return LineResult::WriteFailed;
        }

        let Some(entry) = next_entry(&trade, sink.running_total, direction) else {
            error!(trader_id = %trade.trader_id, line, "running total overflow, dropping trade line");
            self.summary.lines_dropped += 1;
            return LineResult::Dropped;
        };
        match writeln!(sink.writer, "{}", entry.to_row()) {
            Ok(()) => {
                sink.running_total = entry.running_total;
                self.summary.lines_written += 1;
                LineResult::Written
            }
            Err(e) => {
                error!(trader_id = %trade.trader_id, error = %e, "ledger write failed");
                sink.failed = true;
                self.summary.write_failures.push(trade.trader_id);
                LineResult::WriteFailed
            }
        }
    }

    /// Flush every sink and return the counters.
    pub fn finish(&mut self) -> BuildSummary {
        for (trader_id, sink) in self.sinks.iter_mut() {
            if !sink.failed {
                if let Err(e) = sink.writer.flush() {
                    warn!(trader_id = %trader_id, error = %e, "ledger flush failed");
                    sink.failed = true;
                    self.summary.write_failures.push(trader_id.clone());
                }
            }
            self.summary
                .totals
                .insert(trader_id.clone(), sink.running_total);
        }
        info!(
            written = self.summary.lines_written,
            dropped = self.summary.lines_dropped,
            ignored = self.summary.lines_ignored,
            traders = self.sinks.len(),
            "ledger build complete"
        );
        self.summary.clone()
    }

    /// Hand back the sinks, keyed by trader id.
    pub fn into_writers(self) -> BTreeMap<String, W> {
        self.sinks
            .into_iter()
            .map(|(id, sink)| (id, sink.writer))
            .collect()
    }
}

/// Ledger row for `trade` given the trader's running total so far; `None`
/// when the profit or the new total overflows.
pub fn next_entry(trade: &TradeLine, running_total: i64, direction: Direction) -> Option<LedgerEntry> {
    let tick = tick_profit(trade.filled_price, trade.exit_price, direction)?;
    let running_total = running_total.checked_add(tick)?;
    let placed_at = DateTime::from_timestamp(trade.placed_at, 0)
        .map(|dt| dt.format(LEDGER_TIME_FORMAT).to_string())
        .unwrap_or_default();
    Some(LedgerEntry {
        placed_at,
        filled_price: trade.filled_price,
        exit_price: trade.exit_price,
        tick_profit: tick,
        running_total,
        state: trade.state.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LEGACY_RAW_TRADE_HEADER, RAW_TRADE_HEADER};

    /// tradeId,traderId,timeToPlace,dayOfWeek,dayOfMonth,month,weekOfYear,
    /// placedDateTime,limitPrice,stopPrice,state,filledPrice,exitPrice,direction
    fn raw(trader: &str, placed: i64, filled: i64, exit: i64, state: &str) -> String {
        format!("1,{trader},0,1,1,1,1,{placed},0,0,{state},{filled},{exit},1")
    }

    fn builder(direction: Direction, traders: &[&str]) -> LedgerBuilder<Vec<u8>> {
        let header = HeaderMap::parse(RAW_TRADE_HEADER);
        let mut b = LedgerBuilder::new(&header, direction).unwrap();
        for t in traders {
            b.add_sink(*t, Vec::new()).unwrap();
        }
        b
    }

    fn output(b: LedgerBuilder<Vec<u8>>, trader: &str) -> String {
        let writers = b.into_writers();
        String::from_utf8(writers[trader].clone()).unwrap()
    }

    #[test]
    fn short_trade_example() {
        let mut b = builder(Direction::Short, &["t1"]);
        assert_eq!(b.process_line(&raw("t1", 0, 100, 90, "STOPPED")), LineResult::Written);
        let summary = b.finish();
        assert_eq!(summary.totals["t1"], 10);
        assert_eq!(
            output(b, "t1"),
            format!("{LEDGER_HEADER}\n1970-01-01 00:00:00,100,90,10,10,STOPPED\n")
        );
    }

    #[test]
    fn running_total_accumulates() {
        let mut b = builder(Direction::Long, &["t1"]);
        b.process_line(&raw("t1", 60, 100, 104, "LIMIT"));
        b.process_line(&raw("t1", 120, 100, 97, "STOPPED"));
        b.process_line(&raw("t1", 180, 100, 100, "OUT_OF_TIME"));
        assert_eq!(b.finish().totals["t1"], 1);
        let text = output(b, "t1");
        let totals: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split(',').nth(4).unwrap())
            .collect();
        assert_eq!(totals, vec!["4", "1", "1"]);
    }

    #[test]
    fn unknown_trader_and_sentinel_are_not_written() {
        let mut b = builder(Direction::Long, &["t1"]);
        assert_eq!(b.process_line(&raw("t2", 0, 1, 2, "LIMIT")), LineResult::Ignored);
        assert_eq!(b.process_line("POISON"), LineResult::Skipped);
        assert_eq!(b.process_line(&raw("t1", 0, 1, 2, "POISON_PILL")), LineResult::Skipped);
        assert_eq!(b.process_line(""), LineResult::Skipped);
        let summary = b.finish();
        assert_eq!(summary.lines_written, 0);
        assert_eq!(summary.lines_ignored, 1);
        assert_eq!(summary.lines_skipped, 3);
    }

    #[test]
    fn bad_numbers_are_dropped() {
        let mut b = builder(Direction::Long, &["t1"]);
        assert_eq!(b.process_line(&raw("t1", 0, 1, 2, "LIMIT").replace(",2,1", ",x,1")), LineResult::Dropped);
        assert_eq!(b.process_line("1,t1,0"), LineResult::Dropped);
        assert!(matches!(
            b.parse_line(&raw("t1", i64::MAX, 1, 2, "LIMIT")),
            ParseOutcome::Fatal(_)
        ));
        assert_eq!(b.finish().lines_dropped, 2);
    }

    #[test]
    fn overflowing_profit_is_dropped() {
        let mut b = builder(Direction::Long, &["t1"]);
        let line = raw("t1", 0, -1, i64::MAX, "LIMIT");
        match b.parse_line(&line) {
            ParseOutcome::Fatal(failure) => assert_eq!(failure.reason, "profit overflow"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(b.process_line(&line), LineResult::Dropped);
        assert_eq!(b.process_line(&raw("t1", 60, 100, 104, "LIMIT")), LineResult::Written);
        let summary = b.finish();
        assert_eq!(summary.lines_dropped, 1);
        assert_eq!(summary.totals["t1"], 4);
    }

    #[test]
    fn overflowing_running_total_is_dropped() {
        let mut b = builder(Direction::Long, &["t1"]);
        assert_eq!(b.process_line(&raw("t1", 0, 0, i64::MAX, "LIMIT")), LineResult::Written);
        assert_eq!(b.process_line(&raw("t1", 60, 0, 1, "LIMIT")), LineResult::Dropped);
        let summary = b.finish();
        assert_eq!(summary.totals["t1"], i64::MAX);
        assert_eq!(summary.lines_dropped, 1);
    }

    #[test]
    fn numeric_fields_are_trimmed() {
        let b = builder(Direction::Long, &["t1"]);
        let line = "1, t1 ,0,1,1,1,1, 60 ,0,0,LIMIT, 100 , 101 ,1";
        match b.parse_line(line) {
            ParseOutcome::Ok(trade) => {
                assert_eq!(trade.trader_id, "t1");
                assert_eq!(trade.placed_at, 60);
                assert_eq!(trade.exit_price, 101);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_column_is_rejected() {
        let header = HeaderMap::parse("traderId,filledPrice");
        let err = LedgerBuilder::<Vec<u8>>::new(&header, Direction::Long).err().unwrap();
        assert!(matches!(err, LedgerError::Codec(_)));
    }

    #[test]
    fn legacy_layout_resolves() {
        let header = HeaderMap::parse(LEGACY_RAW_TRADE_HEADER);
        let mut b = LedgerBuilder::new(&header, Direction::Long).unwrap();
        b.add_sink("t1", Vec::new()).unwrap();
        let line = "t1,0,1,1,1,1,0,0,0,LIMIT,10,12,1";
        assert_eq!(b.process_line(line), LineResult::Written);
        assert_eq!(b.finish().totals["t1"], 2);
    }
}
