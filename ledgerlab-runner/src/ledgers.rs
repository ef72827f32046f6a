//! Ledger stage: raw per-trader trade files → formatted, sorted ledgers.
//!
//! Two layouts are produced from the same builder:
//! - `formatted-trades/<traderId>.csv`, one per routed raw file, always sorted
//! - `profits/trader-profit-<traderId>-<direction>.csv`, built straight from
//!   partition data files for a given trader list

use ledgerlab_core::codec::{validate_header, CodecError, HeaderMap, TraderIdColumn};
use ledgerlab_core::ledger::{sort_ledger_dir, BuildSummary, Direction, LedgerBuilder, SortSummary};
use ledgerlab_core::storage::Decompressor;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::runner::RunError;

/// Outcome of one ledger stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    /// Input files that were read to the end.
    pub files_processed: usize,
    /// Input files rejected for a header mismatch or read error.
    pub files_skipped: Vec<PathBuf>,
    /// Ledger files that could not be created; their traders get no ledger.
    pub outputs_failed: Vec<PathBuf>,
    pub build: BuildSummary,
    pub sort: Option<SortSummary>,
}

/// Build one formatted ledger per raw trader file, then sort them.
///
/// Every raw file gets its output created (with header) before any line is
/// read, so a raw file with a bad header still leaves an empty ledger. An
/// output that cannot be created is logged and its raw file is not read.
/// A header mismatch on the first file read aborts the stage.
pub fn build_formatted_ledgers(
    raw_dir: &Path,
    out_dir: &Path,
    direction: Direction,
    column: TraderIdColumn,
) -> Result<LedgerSummary, RunError> {
    fs::create_dir_all(out_dir)?;
    let raw_files = list_files(raw_dir)?;

    let header = HeaderMap::parse(column.raw_header());
    let mut builder = LedgerBuilder::new(&header, direction)?;
    let mut summary = LedgerSummary::default();
    let mut inputs = Vec::with_capacity(raw_files.len());
    for path in &raw_files {
        let Some(trader_id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        let Some(name) = path.file_name() else {
            continue;
        };
        if open_sink(&mut builder, trader_id, &out_dir.join(name), &mut summary) {
            inputs.push(path);
        }
    }

    for (n, path) in inputs.into_iter().enumerate() {
        let outcome = File::open(path).and_then(|file| feed(&mut builder, BufReader::new(file), column));
        escalate_first(n, path, &outcome)?;
        record(&mut summary, path, outcome);
    }
    summary.build = builder.finish();
    drop(builder);

    summary.sort = Some(sort_ledger_dir(out_dir)?);
    info!(
        dir = %out_dir.display(),
        files = summary.files_processed,
        skipped = summary.files_skipped.len(),
        outputs_failed = summary.outputs_failed.len(),
        "formatted ledgers built"
    );
    Ok(summary)
}

/// Build profit ledgers for `trader_ids` from partition data files.
///
/// Data files are read in partition-index order (`...p<N>.csv...`); files
/// without an index go last. A trader whose ledger cannot be created is
/// logged and skipped. A header mismatch on the first data file aborts the
/// stage.
pub fn build_profit_ledgers(
    trader_ids: &[String],
    data_files: &[PathBuf],
    out_dir: &Path,
    direction: Direction,
    column: TraderIdColumn,
    decompressor: &dyn Decompressor,
    sort: bool,
) -> Result<LedgerSummary, RunError> {
    fs::create_dir_all(out_dir)?;

    let header = HeaderMap::parse(column.raw_header());
    let mut builder = LedgerBuilder::new(&header, direction)?;
    let mut summary = LedgerSummary::default();
    for trader_id in trader_ids {
        let path = out_dir.join(profit_file_name(trader_id, direction));
        open_sink(&mut builder, trader_id.clone(), &path, &mut summary);
    }

    for (n, path) in order_by_partition(data_files).into_iter().enumerate() {
        info!(file = %path.display(), "processing data file");
        let outcome = File::open(&path).and_then(|file| {
            let decoded = decompressor.decode(Box::new(file));
            feed(&mut builder, BufReader::new(decoded), column)
        });
        escalate_first(n, &path, &outcome)?;
        record(&mut summary, &path, outcome);
    }
    summary.build = builder.finish();
    drop(builder);

    if sort {
        summary.sort = Some(sort_ledger_dir(out_dir)?);
    }
    Ok(summary)
}

/// `trader-profit-<id>-<long|short>.csv`
pub fn profit_file_name(trader_id: &str, direction: Direction) -> String {
    format!("trader-profit-{trader_id}-{}.csv", direction.label())
}

/// Trader ids from a text file, one per line; blank lines ignored.
pub fn read_trader_ids(path: &Path) -> io::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Partition index of a data file name: the digits of the first `p<N>.csv`.
pub fn partition_index(name: &str) -> Option<u32> {
    for (pos, _) in name.match_indices(".csv") {
        let head = &name[..pos];
        let digits = head.len() - head.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            continue;
        }
        let start = pos - digits;
        if head[..start].ends_with('p') {
            if let Ok(index) = head[start..].parse() {
                return Some(index);
            }
        }
    }
    None
}

/// Stable order by partition index, unindexed files last.
pub fn order_by_partition(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut ordered = files.to_vec();
    ordered.sort_by_key(|path| {
        path.file_name()
            .and_then(|n| partition_index(&n.to_string_lossy()))
            .unwrap_or(u32::MAX)
    });
    ordered
}

/// Create a ledger file and register it with the builder. Failures are
/// logged and recorded; returns whether the sink is live.
fn open_sink(
    builder: &mut LedgerBuilder<BufWriter<File>>,
    trader_id: String,
    path: &Path,
    summary: &mut LedgerSummary,
) -> bool {
    let opened = File::create(path).and_then(|file| builder.add_sink(trader_id, BufWriter::new(file)));
    match opened {
        Ok(()) => true,
        Err(e) => {
            error!(file = %path.display(), error = %e, "failed to create ledger, skipping trader");
            summary.outputs_failed.push(path.to_path_buf());
            false
        }
    }
}

/// Validate the header of one input, then feed all its lines. An empty input
/// counts as a header mismatch.
fn feed<W: io::Write, R: Read>(
    builder: &mut LedgerBuilder<W>,
    reader: BufReader<R>,
    column: TraderIdColumn,
) -> io::Result<Result<(), CodecError>> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => String::new(),
    };
    if let Err(e) = validate_header(&header, column.raw_header()) {
        return Ok(Err(e));
    }
    for line in lines {
        builder.process_line(&line?);
    }
    Ok(Ok(()))
}

/// The first input of a stage must carry the expected header.
fn escalate_first(
    index: usize,
    path: &Path,
    outcome: &io::Result<Result<(), CodecError>>,
) -> Result<(), RunError> {
    match outcome {
        Ok(Err(e)) if index == 0 => {
            error!(file = %path.display(), error = %e, "first trade file has the wrong header, aborting");
            Err(RunError::Codec(e.clone()))
        }
        _ => Ok(()),
    }
}

fn record(summary: &mut LedgerSummary, path: &Path, outcome: io::Result<Result<(), CodecError>>) {
    match outcome {
        Ok(Ok(())) => summary.files_processed += 1,
        Ok(Err(reason)) => {
            error!(file = %path.display(), reason = %reason, "skipping trade file");
            summary.files_skipped.push(path.to_path_buf());
        }
        Err(e) => {
            error!(file = %path.display(), error = %e, "failed to read trade file");
            summary.files_skipped.push(path.to_path_buf());
        }
    }
}

/// Every file under `dir`, recursively, sorted by path.
pub fn list_data_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}
