//! Grouping of summary object keys by scenario and concatenation of sources.
//!
//! Summary keys look like `<symbol>/<scenario>/<...>.csv`.

use tracing::warn;

/// A scenario plus the ordered keys of the objects that contribute to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioGroup {
    pub scenario: String,
    pub keys: Vec<String>,
}

/// Scenario segment of a summary key, if the key has one.
pub fn scenario_of<'a>(symbol: &str, key: &'a str) -> Option<&'a str> {
    let rest = key.strip_prefix(symbol)?.strip_prefix('/')?;
    match rest.split_once('/') {
        Some((scenario, _)) if !scenario.is_empty() => Some(scenario),
        _ => None,
    }
}

/// Group keys by scenario, keeping first-seen scenario order and key order.
///
/// With `only` set, keys of every other scenario are dropped.
pub fn group_by_scenario<S: AsRef<str>>(
    symbol: &str,
    keys: &[S],
    only: Option<&str>,
) -> Vec<ScenarioGroup> {
    let mut groups: Vec<ScenarioGroup> = Vec::new();
    for key in keys {
        let key = key.as_ref();
        let Some(scenario) = scenario_of(symbol, key) else {
            warn!(key, "key does not contain a scenario folder");
            continue;
        };
        if only.is_some_and(|wanted| wanted != scenario) {
            continue;
        }
        match groups.iter_mut().find(|g| g.scenario == scenario) {
            Some(group) => group.keys.push(key.to_string()),
            None => groups.push(ScenarioGroup {
                scenario: scenario.to_string(),
                keys: vec![key.to_string()],
            }),
        }
    }
    groups
}

/// Concatenate source contents, keeping only the first source's header.
///
/// Every source ends with a newline in the result.
pub fn concat_sources<S: AsRef<str>>(sources: &[S]) -> String {
    let mut out = String::new();
    for (i, source) in sources.iter().enumerate() {
        let mut body = source.as_ref();
        if i > 0 {
            body = match body.find('\n') {
                Some(pos) => &body[pos + 1..],
                // header only, no data
                None => "",
            };
        }
        if body.is_empty() {
            continue;
        }
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Remove every double quote from aggregated content.
pub fn strip_quotes(content: &str) -> String {
    content.replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_segment() {
        assert_eq!(scenario_of("btc-1mF", "btc-1mF/s_1/agg/x.csv"), Some("s_1"));
        assert_eq!(scenario_of("btc-1mF", "btc-1mF/x.csv"), None);
        assert_eq!(scenario_of("btc-1mF", "eth-1mF/s_1/x.csv"), None);
        assert_eq!(scenario_of("btc", "btc-1mF/s_1/x.csv"), None);
    }

    #[test]
    fn grouping_preserves_order_and_filters() {
        let keys = [
            "sym/b/1.csv",
            "sym/a/1.csv",
            "sym/b/2.csv",
            "sym/stray.csv",
        ];
        let groups = group_by_scenario("sym", &keys, None);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].scenario, "b");
        assert_eq!(groups[0].keys, vec!["sym/b/1.csv", "sym/b/2.csv"]);
        assert_eq!(groups[1].scenario, "a");

        let only_a = group_by_scenario("sym", &keys, Some("a"));
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].keys, vec!["sym/a/1.csv"]);
    }

    #[test]
    fn concat_strips_later_headers() {
        let out = concat_sources(&["h1,h2\n1,2", "h1,h2\n3,4\n", "h1,h2"]);
        assert_eq!(out, "h1,h2\n1,2\n3,4\n");
    }

    #[test]
    fn quotes_removed() {
        assert_eq!(strip_quotes("\"a\",\"b\"\n"), "a,b\n");
    }
}
