use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use common::symbols::QUOTE_ASSET;
use common::Announcement;

/// Announcement category queried from the exchange.
pub const ANNOUNCEMENT_TYPE: &str = "delistings";

/// How far back announcements are considered.
pub const LOOKBACK_DAYS: i64 = 60;

/// Title templates the exchange uses for perpetual delisting notices.
/// Matched after collapsing internal whitespace runs to a single space.
const TITLE_PATTERNS: [&str; 2] = [
    r"^Delisting of (.+)USDT Perpetual Contract$",
    r"^Delisting of (.+) Perpetual Contracts$",
];

/// Extract the delisted exchange symbols from one announcement title.
///
/// Coin lists inside a title are comma- or "and"-joined
/// ("Delisting of BTC and ETH USDT Perpetual Contract"); each coin is
/// suffixed with the quote asset. Returns an empty vec for titles that
/// match no template.
pub fn parse_delisting_title(title: &str) -> Vec<String> {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut symbols = Vec::new();
    for pattern in TITLE_PATTERNS {
        let regex = Regex::new(pattern).expect("delisting pattern is valid");
        let Some(captures) = regex.captures(&collapsed) else {
            continue;
        };
        let coins = captures[1].replace(" and ", ",").replace(' ', "");
        for coin in coins.split(',') {
            let coin = coin.trim();
            if coin.is_empty() {
                continue;
            }
            symbols.push(format!("{coin}{QUOTE_ASSET}"));
        }
    }
    symbols
}

/// Build the exclusion set from recent announcements. Entries older than
/// `lookback_days` are ignored.
pub fn delisted_symbols(
    announcements: &[Announcement],
    now: DateTime<Utc>,
    lookback_days: i64,
) -> HashSet<String> {
    let cutoff = now - Duration::days(lookback_days);
    announcements
        .iter()
        .filter(|a| !a.title.trim().is_empty() && a.published_at > cutoff)
        .flat_map(|a| parse_delisting_title(&a.title))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_parsing_table() {
        let cases: &[(&str, &[&str])] = &[
            ("Delisting of BTCUSDT Perpetual Contract", &["BTCUSDT"]),
            (
                "Delisting of BTC and ETH USDT Perpetual Contract",
                &["BTCUSDT", "ETHUSDT"],
            ),
            (
                "Delisting of BTC, ETH and SOL USDT Perpetual Contract",
                &["BTCUSDT", "ETHUSDT", "SOLUSDT"],
            ),
            ("Delisting of XYZ Perpetual Contracts", &["XYZUSDT"]),
            (
                "Delisting of ABC and DEF Perpetual Contracts",
                &["ABCUSDT", "DEFUSDT"],
            ),
            // Extra internal whitespace still matches after normalization.
            ("Delisting  of   XYZUSDT Perpetual Contract", &["XYZUSDT"]),
            // Coin names containing "and" are not split.
            ("Delisting of SANDUSDT Perpetual Contract", &["SANDUSDT"]),
            // Non-delisting titles produce nothing.
            ("New listing: BTCUSDT Perpetual Contract", &[]),
            ("Delisting of spot trading pairs", &[]),
            ("", &[]),
        ];

        for (title, expected) in cases {
            let parsed = parse_delisting_title(title);
            assert_eq!(&parsed, expected, "title: {title:?}");
        }
    }

    #[test]
    fn announcements_outside_lookback_are_ignored() {
        let now = Utc::now();
        let announcements = vec![
            Announcement {
                title: "Delisting of OLDUSDT Perpetual Contract".into(),
                published_at: now - Duration::days(90),
            },
            Announcement {
                title: "Delisting of NEWUSDT Perpetual Contract".into(),
                published_at: now - Duration::days(5),
            },
        ];

        let set = delisted_symbols(&announcements, now, LOOKBACK_DAYS);
        assert!(set.contains("NEWUSDT"));
        assert!(!set.contains("OLDUSDT"));
    }

    #[test]
    fn blank_titles_are_skipped() {
        let now = Utc::now();
        let announcements = vec![Announcement {
            title: "   ".into(),
            published_at: now,
        }];
        assert!(delisted_symbols(&announcements, now, LOOKBACK_DAYS).is_empty());
    }
}
