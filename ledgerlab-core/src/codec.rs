//! Row codec: header maps, header validation, and naive field splitting.
//!
//! Rows are split on every comma; quoted commas are not supported. Tokens
//! used as lookup or dedup keys go through [`clean_token`] (trim + quote
//! strip), while fields parsed as numbers are only whitespace-trimmed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Raw trade header of the combined trades bucket (trader id at position 1).
pub const RAW_TRADE_HEADER: &str = "tradeId,traderId,timeToPlace,dayOfWeek,dayOfMonth,month,weekOfYear,placedDateTime,limitPrice,stopPrice,state,filledPrice,exitPrice,direction";

/// Raw trade header of the legacy per-scenario exports (trader id first).
pub const LEGACY_RAW_TRADE_HEADER: &str = "traderId,timeToPlace,dayOfWeek,dayOfMonth,month,weekOfYear,placedDateTime,limitPrice,stopPrice,state,filledPrice,exitPrice,direction";

/// Header of every formatted per-trader ledger file.
pub const LEDGER_HEADER: &str = "PlaceDateTime,FilledPrice,ClosingPrice,Profit,RunningTotalProfit,State";

/// Column name the router and extractor look for (case-insensitive).
pub const TRADER_ID_COLUMN: &str = "traderid";

/// Errors raised while interpreting a header line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("header mismatch: expected '{expected}', found '{found}'")]
    HeaderMismatch { expected: String, found: String },

    #[error("missing required column: {0}")]
    MissingColumn(String),
}

/// Which raw-trade layout a partition uses.
///
/// The combined bucket carries a `tradeId` column first and the trader id
/// second; legacy exports start with the trader id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraderIdColumn {
    #[default]
    Combined,
    Legacy,
}

impl TraderIdColumn {
    /// Zero-based position of the trader id field.
    pub fn position(self) -> usize {
        match self {
            TraderIdColumn::Combined => 1,
            TraderIdColumn::Legacy => 0,
        }
    }

    /// The exact header line expected for this layout.
    pub fn raw_header(self) -> &'static str {
        match self {
            TraderIdColumn::Combined => RAW_TRADE_HEADER,
            TraderIdColumn::Legacy => LEGACY_RAW_TRADE_HEADER,
        }
    }

    /// Check that the header names the trader id at this layout's position.
    pub fn check_header(self, header_line: &str) -> Result<(), CodecError> {
        let fields = split_fields(header_line);
        match fields.get(self.position()) {
            Some(name) if clean_token(name).eq_ignore_ascii_case(TRADER_ID_COLUMN) => Ok(()),
            _ => Err(CodecError::HeaderMismatch {
                expected: format!("{TRADER_ID_COLUMN} at column {}", self.position()),
                found: header_line.to_string(),
            }),
        }
    }
}

/// Split a row on commas without any quote handling.
pub fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').collect()
}

/// Trim surrounding whitespace and remove double quotes.
pub fn clean_token(token: &str) -> String {
    token.trim().replace('"', "")
}

/// Column name → zero-based position, built from a header line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    columns: HashMap<String, usize>,
    names: Vec<String>,
}

impl HeaderMap {
    /// Build a map from the literal header tokens. A repeated name keeps its
    /// last position.
    pub fn parse(header_line: &str) -> Self {
        let names: Vec<String> = split_fields(header_line)
            .into_iter()
            .map(str::to_string)
            .collect();
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { columns, names }
    }

    /// Build a map from cleaned header tokens (trimmed, quotes removed).
    pub fn parse_cleaned(header_line: &str) -> Self {
        let names: Vec<String> = split_fields(header_line)
            .into_iter()
            .map(clean_token)
            .collect();
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { columns, names }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    /// Position of `name`, or `MissingColumn`.
    pub fn index_of(&self, name: &str) -> Result<usize, CodecError> {
        self.get(name)
            .ok_or_else(|| CodecError::MissingColumn(name.to_string()))
    }

    /// First position whose name equals `name` ignoring ASCII case.
    pub fn position_ignore_case(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Require the header line to equal `expected` exactly.
pub fn validate_header(header_line: &str, expected: &str) -> Result<(), CodecError> {
    if header_line == expected {
        Ok(())
    } else {
        Err(CodecError::HeaderMismatch {
            expected: expected.to_string(),
            found: header_line.to_string(),
        })
    }
}
