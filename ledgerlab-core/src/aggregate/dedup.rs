//! Composite-key deduplication of a concatenated scenario row-set.
//!
//! The first line is the header. Every later non-blank line is reduced to a
//! key built from the selected columns; the first line carrying a key is kept
//! and later ones are dropped. The emitted header has each token re-quoted.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::codec::{clean_token, split_fields, HeaderMap};

/// Key columns used for scenario summary rows.
pub const DEFAULT_DEDUP_COLUMNS: [&str; 7] = [
    "dayofweek",
    "hourofday",
    "stop",
    "limit",
    "tickoffset",
    "tradeduration",
    "outoftime",
];

/// Result of a dedup pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DedupOutput {
    /// Re-quoted header plus the unique rows, each newline-terminated.
    pub content: String,
    pub duplicates_removed: usize,
    pub rows_kept: usize,
    /// Requested key columns that were not found in the header.
    pub missing_columns: Vec<String>,
}

/// Wrap every header token in exactly one pair of double quotes.
pub fn requote_header(header_line: &str) -> String {
    split_fields(header_line)
        .into_iter()
        .map(|token| format!("\"{}\"", clean_token(token)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the composite key of one row from the resolved column positions.
///
/// Positions past the end of the row are left out of the key.
pub fn row_key(fields: &[&str], indices: &[usize]) -> String {
    let mut key = String::new();
    for &idx in indices {
        if let Some(value) = fields.get(idx) {
            key.push_str(value.trim());
            key.push('|');
        }
    }
    key
}

/// Collapse `content` to unique rows keyed on `key_columns`, in first-seen order.
pub fn dedup_rows<S: AsRef<str>>(content: &str, key_columns: &[S]) -> DedupOutput {
    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return DedupOutput::default();
    };

    let header_map = HeaderMap::parse_cleaned(header);
    let mut indices = Vec::with_capacity(key_columns.len());
    let mut missing_columns = Vec::new();
    for column in key_columns {
        let column = column.as_ref();
        match header_map.get(column) {
            Some(idx) => indices.push(idx),
            None => {
                warn!(column, "dedup column not found in header, dropping it from the key");
                missing_columns.push(column.to_string());
            }
        }
    }

    let mut out = requote_header(header);
    out.push('\n');

    let mut seen: HashSet<String> = HashSet::new();
    let mut duplicates_removed = 0;
    let mut rows_kept = 0;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line);
        if seen.insert(row_key(&fields, &indices)) {
            out.push_str(line);
            out.push('\n');
            rows_kept += 1;
        } else {
            duplicates_removed += 1;
        }
    }

    info!(duplicates_removed, rows_kept, "dedup pass complete");
    info!(output_len = out.len(), "filtered output length");

    DedupOutput {
        content: out,
        duplicates_removed,
        rows_kept,
        missing_columns,
    }
}
