//! Trade Router: groups raw trade lines by trader and appends them to
//! per-trader files.
//!
//! One router call handles one partition stream. Lines are buffered per
//! trader for the whole stream and flushed afterwards, so every trader file
//! is opened once per partition and only ever appended to.

use crate::codec::{split_fields, CodecError, TraderIdColumn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("router I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Counters for one routed stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSummary {
    /// Non-blank data lines read (header excluded).
    pub lines_read: u64,
    /// Lines whose trader id is in the index.
    pub lines_matched: u64,
    /// Trader files appended to successfully.
    pub traders_written: usize,
    /// Trader ids whose file could not be written.
    pub write_failures: Vec<String>,
}

impl RouteSummary {
    pub fn absorb(&mut self, other: RouteSummary) {
        self.lines_read += other.lines_read;
        self.lines_matched += other.lines_matched;
        self.traders_written += other.traders_written;
        self.write_failures.extend(other.write_failures);
    }
}

pub struct TradeRouter {
    trader_ids: BTreeSet<String>,
    out_dir: PathBuf,
    column: TraderIdColumn,
}

impl TradeRouter {
    pub fn new(trader_ids: BTreeSet<String>, out_dir: impl Into<PathBuf>, column: TraderIdColumn) -> Self {
        Self {
            trader_ids,
            out_dir: out_dir.into(),
            column,
        }
    }

    /// Per-trader output file.
    pub fn trader_path(&self, trader_id: &str) -> PathBuf {
        self.out_dir.join(format!("{trader_id}.csv"))
    }

    /// Route one partition stream.
    ///
    /// An empty stream is not an error. A header that does not name the
    /// trader id at the configured position is.
    pub fn route<R: BufRead>(&self, reader: R) -> Result<RouteSummary, RouterError> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line?,
            None => {
                warn!("empty partition stream");
                return Ok(RouteSummary::default());
            }
        };
        self.column.check_header(&header)?;

        let position = self.column.position();
        let mut summary = RouteSummary::default();
        let mut buffers: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            summary.lines_read += 1;

            let trader_id = match split_fields(&line).get(position) {
                Some(field) => field.trim().to_string(),
                None => {
                    warn!(line = i + 2, "row too short for trader id, skipping");
                    continue;
                }
            };
            if self.trader_ids.contains(&trader_id) {
                summary.lines_matched += 1;
                buffers.entry(trader_id).or_default().push(line);
            }
        }

        for (trader_id, rows) in buffers {
            match self.append(&trader_id, &rows) {
                Ok(()) => summary.traders_written += 1,
                Err(e) => {
                    error!(trader_id = %trader_id, error = %e, "failed to append trader rows");
                    summary.write_failures.push(trader_id);
                }
            }
        }

        debug!(
            read = summary.lines_read,
            matched = summary.lines_matched,
            traders = summary.traders_written,
            "routed partition"
        );
        Ok(summary)
    }

    fn append(&self, trader_id: &str, rows: &[String]) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.trader_path(trader_id))?;
        let mut writer = io::BufWriter::new(file);
        for row in rows {
            writeln!(writer, "{row}")?;
        }
        writer.flush()
    }
}

/// Outcome of a header pass over a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderPass {
    pub inserted: usize,
    pub already_present: usize,
    /// Files that could not be read or rewritten; left as they were.
    pub failed: Vec<PathBuf>,
}

/// Prepend `header` to every `.csv` file in `dir` whose first line is not
/// already exactly `header`.
///
/// Running it twice leaves the files unchanged the second time. A file that
/// cannot be read or rewritten is logged and skipped; only failing to read
/// the directory is an error.
pub fn ensure_headers(dir: &Path, header: &str) -> io::Result<HeaderPass> {
    let mut pass = HeaderPass::default();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    for path in paths {
        let outcome = first_line(&path).and_then(|first| {
            if first.as_deref() == Some(header) {
                Ok(false)
            } else {
                prepend_line(&path, header).map(|()| true)
            }
        });
        match outcome {
            Ok(true) => pass.inserted += 1,
            Ok(false) => pass.already_present += 1,
            Err(e) => {
                error!(file = %path.display(), error = %e, "failed to add header");
                pass.failed.push(path);
            }
        }
    }

    info!(
        dir = %dir.display(),
        inserted = pass.inserted,
        present = pass.already_present,
        failed = pass.failed.len(),
        "header pass complete"
    );
    Ok(pass)
}

fn first_line(path: &Path) -> io::Result<Option<String>> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Ok(Some(trimmed.to_string()))
}

fn prepend_line(path: &Path, header: &str) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    writeln!(tmp, "{header}")?;
    io::copy(&mut fs::File::open(path)?, &mut tmp)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
