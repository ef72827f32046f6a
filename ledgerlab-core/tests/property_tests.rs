//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Dedup idempotence and row count = distinct keys + header
//! 2. Header re-quoting yields exactly one pair of quotes per token
//! 3. Running total recurrence in built ledgers
//! 4. Sorter output is ordered and its totals are prefix sums
//! 5. Router append safety across partitions

use ledgerlab_core::aggregate::dedup::row_key;
use ledgerlab_core::aggregate::{dedup_rows, requote_header};
use ledgerlab_core::codec::{HeaderMap, TraderIdColumn, LEDGER_HEADER, RAW_TRADE_HEADER};
use ledgerlab_core::ledger::{sort_lines, Direction, LedgerBuilder};
use ledgerlab_core::router::TradeRouter;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::io::Cursor;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_summary_row() -> impl Strategy<Value = (u8, u8, u8)> {
    (0u8..3, 0u8..3, 0u8..50)
}

fn arb_trade() -> impl Strategy<Value = (usize, i64, i64, i64)> {
    // (trader index, placed epoch secs, filled, exit)
    (0usize..3, 0i64..2_000_000_000, 0i64..10_000, 0i64..10_000)
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

const TRADERS: [&str; 3] = ["t0", "t1", "t2"];

fn raw_line(trader: &str, placed: i64, filled: i64, exit: i64) -> String {
    format!("1,{trader},0,1,1,1,1,{placed},0,0,LIMIT,{filled},{exit},1")
}

// ── 1. Dedup ─────────────────────────────────────────────────────────

proptest! {
    /// Output rows = distinct keys, plus one header line.
    #[test]
    fn dedup_keeps_one_row_per_key(rows in prop::collection::vec(arb_summary_row(), 0..40)) {
        let mut input = String::from("stop,limit,profit\n");
        for (s, l, p) in &rows {
            input.push_str(&format!("{s},{l},{p}\n"));
        }
        let out = dedup_rows(&input, &["stop", "limit"]);

        let distinct: HashSet<(u8, u8)> = rows.iter().map(|(s, l, _)| (*s, *l)).collect();
        prop_assert_eq!(out.content.lines().count(), distinct.len() + 1);
        prop_assert_eq!(out.rows_kept, distinct.len());
        prop_assert_eq!(out.duplicates_removed, rows.len() - distinct.len());
    }

    /// Deduplicating an already deduplicated row-set changes nothing.
    #[test]
    fn dedup_is_idempotent(rows in prop::collection::vec(arb_summary_row(), 0..40)) {
        let mut input = String::from("\"stop\", limit ,profit\n");
        for (s, l, p) in &rows {
            input.push_str(&format!("{s},{l},{p}\n"));
        }
        let once = dedup_rows(&input, &["stop", "limit"]);
        let twice = dedup_rows(&once.content, &["stop", "limit"]);
        prop_assert_eq!(&once.content, &twice.content);
        prop_assert_eq!(twice.duplicates_removed, 0);
    }

    /// Re-quoting wraps each cleaned token in exactly one pair of quotes.
    #[test]
    fn requoted_tokens_have_one_quote_pair(
        tokens in prop::collection::vec("[a-z]{1,8}", 1..8),
        quoted in any::<bool>(),
    ) {
        let header = tokens
            .iter()
            .map(|t| if quoted { format!("\"{t}\"") } else { format!(" {t} ") })
            .collect::<Vec<_>>()
            .join(",");
        let requoted = requote_header(&header);
        for (token, expected) in requoted.split(',').zip(&tokens) {
            prop_assert_eq!(token, format!("\"{expected}\""));
        }
        prop_assert_eq!(requote_header(&requoted), requoted);
    }
}

// ── 2. Ledger running totals ─────────────────────────────────────────

proptest! {
    /// running_total[0] = tick[0]; running_total[i] = running_total[i-1] + tick[i].
    #[test]
    fn running_total_recurrence(
        trades in prop::collection::vec(arb_trade(), 1..30),
        direction in arb_direction(),
    ) {
        let header = HeaderMap::parse(RAW_TRADE_HEADER);
        let mut builder = LedgerBuilder::new(&header, direction).unwrap();
        for t in TRADERS {
            builder.add_sink(t, Vec::new()).unwrap();
        }
        for (trader, placed, filled, exit) in &trades {
            builder.process_line(&raw_line(TRADERS[*trader], *placed, *filled, *exit));
        }
        let summary = builder.finish();
        prop_assert_eq!(summary.lines_written as usize, trades.len());

        for (trader, bytes) in builder.into_writers() {
            let text = String::from_utf8(bytes).unwrap();
            let mut lines = text.lines();
            prop_assert_eq!(lines.next(), Some(LEDGER_HEADER));
            let mut prev = 0i64;
            for line in lines {
                let fields: Vec<&str> = line.split(',').collect();
                let filled: i64 = fields[1].parse().unwrap();
                let exit: i64 = fields[2].parse().unwrap();
                let tick: i64 = fields[3].parse().unwrap();
                let running: i64 = fields[4].parse().unwrap();
                prop_assert_eq!(tick, (exit - filled) * direction.sign());
                prop_assert_eq!(running, prev + tick);
                prev = running;
            }
            prop_assert_eq!(summary.totals[&trader], prev);
        }
    }
}

// ── 3. Sorter ────────────────────────────────────────────────────────

proptest! {
    /// Sorted rows are ordered by time and totals are prefix sums of profit.
    #[test]
    fn sorter_orders_and_recomputes(rows in prop::collection::vec((0u32..500, -100i64..100), 0..40)) {
        let lines: Vec<String> = rows
            .iter()
            .map(|(t, p)| format!("2020-01-01 {:02}:{:02}:00,1,1,{p},999,S", t / 60 % 24, t % 60))
            .collect();
        let sorted = sort_lines(LEDGER_HEADER, &lines).unwrap();
        prop_assert_eq!(sorted.len(), lines.len());

        let mut prev_time = String::new();
        let mut running = 0i64;
        for line in &sorted {
            let fields: Vec<&str> = line.split(',').collect();
            prop_assert!(fields[0] >= prev_time.as_str());
            prev_time = fields[0].to_string();
            running += fields[3].parse::<i64>().unwrap();
            prop_assert_eq!(fields[4].parse::<i64>().unwrap(), running);
        }
    }
}

// ── 4. Router append safety ──────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every matching line of every partition ends up in its trader file, in
    /// partition order then line order.
    #[test]
    fn router_appends_across_partitions(
        partitions in prop::collection::vec(prop::collection::vec(arb_trade(), 0..10), 1..5),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let ids: BTreeSet<String> = TRADERS[..2].iter().map(|s| s.to_string()).collect();
        let router = TradeRouter::new(ids, dir.path(), TraderIdColumn::Combined);

        let mut expected: Vec<Vec<String>> = vec![Vec::new(); TRADERS.len()];
        for partition in &partitions {
            let mut body = format!("{RAW_TRADE_HEADER}\n");
            for (trader, placed, filled, exit) in partition {
                let line = raw_line(TRADERS[*trader], *placed, *filled, *exit);
                body.push_str(&line);
                body.push('\n');
                expected[*trader].push(line);
            }
            router.route(Cursor::new(body)).unwrap();
        }

        for (i, trader) in TRADERS.iter().enumerate() {
            let path = dir.path().join(format!("{trader}.csv"));
            if i == 2 || expected[i].is_empty() {
                prop_assert!(!path.exists());
                continue;
            }
            let text = std::fs::read_to_string(&path).unwrap();
            let got: Vec<&str> = text.lines().collect();
            prop_assert_eq!(got, expected[i].iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}

#[test]
fn row_key_skips_out_of_range_columns() {
    assert_eq!(row_key(&["a", " b ", "c"], &[1, 7, 0]), "b|a|");
}
