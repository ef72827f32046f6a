//! Ledger Sorter: chronological reorder with running-total recomputation.

use super::{LedgerError, ParseFailure};
use crate::codec::{split_fields, HeaderMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

const TIME_COLUMN: &str = "PlaceDateTime";
const PROFIT_COLUMN: &str = "Profit";
const DEFAULT_TIME_INDEX: usize = 0;
const DEFAULT_PROFIT_INDEX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    Sorted { rows: usize },
    /// Nothing to reorder; the file was not rewritten.
    Untouched,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSummary {
    pub sorted: usize,
    pub untouched: usize,
    pub failed: Vec<PathBuf>,
}

/// Sort data lines by the placement-time field and recompute the running
/// total column (the one right after `Profit`).
///
/// Ordering compares the raw field text and is stable. Rows without the time
/// field sort after every row that has it. Blank lines are dropped. Rows too
/// short to carry a profit, or carrying a profit but no running-total field,
/// are passed through unchanged. A total that overflows fails the whole set.
pub fn sort_lines<S: AsRef<str>>(header: &str, lines: &[S]) -> Result<Vec<String>, ParseFailure> {
    let map = HeaderMap::parse(header);
    let time_idx = map.get(TIME_COLUMN).unwrap_or(DEFAULT_TIME_INDEX);
    let profit_idx = map.get(PROFIT_COLUMN).unwrap_or(DEFAULT_PROFIT_INDEX);

    let mut rows: Vec<&str> = lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|l| !l.trim().is_empty())
        .collect();
    rows.sort_by_cached_key(|line| {
        let field = split_fields(line).get(time_idx).map(|f| f.to_string());
        (field.is_none(), field)
    });

    let mut running: i64 = 0;
    let mut out = Vec::with_capacity(rows.len());
    for line in rows {
        let mut fields: Vec<String> = split_fields(line).into_iter().map(str::to_string).collect();
        let Some(profit) = fields.get(profit_idx) else {
            out.push(line.to_string());
            continue;
        };
        let profit: i64 = profit
            .trim()
            .parse()
            .map_err(|e| ParseFailure::new(line, format!("{PROFIT_COLUMN}: {e}")))?;
        running = running
            .checked_add(profit)
            .ok_or_else(|| ParseFailure::new(line, "running total overflow"))?;
        match fields.get_mut(profit_idx + 1) {
            Some(total) => {
                *total = running.to_string();
                out.push(fields.join(","));
            }
            None => out.push(line.to_string()),
        }
    }
    Ok(out)
}

/// Sort one ledger file in place.
///
/// Files with at most one data line are left alone. On a parse failure the
/// file is not modified.
pub fn sort_ledger_file(path: &Path) -> Result<SortOutcome, LedgerError> {
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return Ok(SortOutcome::Untouched);
    };
    let data: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
    if data.len() <= 1 {
        return Ok(SortOutcome::Untouched);
    }

    let sorted = sort_lines(header, &data)?;
    rewrite(path, header, &sorted)?;
    Ok(SortOutcome::Sorted { rows: sorted.len() })
}

fn rewrite(path: &Path, header: &str, rows: &[String]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = io::BufWriter::new(tmp.as_file_mut());
        writeln!(writer, "{header}")?;
        for row in rows {
            writeln!(writer, "{row}")?;
        }
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Sort every regular file in `dir`. Per-file failures are logged and
/// collected; only failing to read the directory is an error.
pub fn sort_ledger_dir(dir: &Path) -> io::Result<SortSummary> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut summary = SortSummary::default();
    for path in paths {
        match sort_ledger_file(&path) {
            Ok(SortOutcome::Sorted { .. }) => summary.sorted += 1,
            Ok(SortOutcome::Untouched) => summary.untouched += 1,
            Err(e) => {
                error!(file = %path.display(), error = %e, "failed to sort ledger");
                summary.failed.push(path);
            }
        }
    }
    info!(
        dir = %dir.display(),
        sorted = summary.sorted,
        untouched = summary.untouched,
        failed = summary.failed.len(),
        "ledger sort complete"
    );
    Ok(summary)
}
