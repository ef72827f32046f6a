//! Upstream scenario aggregation: grouping, dedup, and trader extraction.

pub mod dedup;
pub mod scenario;
pub mod traders;

pub use dedup::{dedup_rows, requote_header, DedupOutput, DEFAULT_DEDUP_COLUMNS};
pub use scenario::{concat_sources, group_by_scenario, scenario_of, strip_quotes, ScenarioGroup};
pub use traders::extract_trader_ids;
