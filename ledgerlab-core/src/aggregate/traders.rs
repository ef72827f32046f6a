//! Distinct trader ids of a deduplicated scenario row-set.

use std::collections::BTreeSet;
use tracing::{error, info, warn};

use crate::codec::{clean_token, split_fields, CodecError, TRADER_ID_COLUMN};

/// Collect the distinct, cleaned values of the `traderid` column.
///
/// The column is matched case-insensitively. Rows too short to reach it are
/// skipped with a warning.
pub fn extract_trader_ids(content: &str) -> Result<BTreeSet<String>, CodecError> {
    let mut trader_ids = BTreeSet::new();
    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return Ok(trader_ids);
    };

    let Some(trader_idx) = split_fields(header)
        .into_iter()
        .position(|name| clean_token(name).eq_ignore_ascii_case(TRADER_ID_COLUMN))
    else {
        error!("the CSV header does not contain a 'traderid' column");
        return Err(CodecError::MissingColumn(TRADER_ID_COLUMN.to_string()));
    };

    for (i, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match split_fields(line).get(trader_idx) {
            Some(value) => {
                trader_ids.insert(clean_token(value));
            }
            // +2: one for the header, one for 1-based numbering
            None => warn!(line = i + 2, "skipping line without a trader id column"),
        }
    }

    info!(count = trader_ids.len(), "extracted unique trader ids");
    Ok(trader_ids)
}
