/// The quote asset every traded perpetual is expected to settle in.
pub const QUOTE_ASSET: &str = "USDT";

/// Numeric scale prefixes exchanges attach to low-priced coins
/// ("1000PEPE" trades 1000 PEPE per contract). Longest first so a longer
/// prefix is never partially stripped by a shorter one.
const SCALE_PREFIXES: [&str; 8] = [
    "10000000000",
    "1000000000",
    "100000000",
    "10000000",
    "1000000",
    "100000",
    "10000",
    "1000",
];

/// Strip numeric scale prefixes and the quote-asset suffix from an exchange
/// symbol, yielding the coin name used by the market-data provider.
pub fn normalize_coin(symbol: &str) -> String {
    let mut coin = symbol.to_string();
    for prefix in SCALE_PREFIXES {
        coin = coin.replace(prefix, "");
    }
    coin.replace(QUOTE_ASSET, "")
}

/// A stable-coin self-pair carries no directional information and is never
/// selected or scored.
pub fn is_stable_pair(symbol: &str) -> bool {
    symbol.eq_ignore_ascii_case("USDCUSDT")
}

/// Whether a ticker symbol belongs to the traded quote universe.
pub fn is_traded_symbol(symbol: &str) -> bool {
    symbol.ends_with(QUOTE_ASSET) && !is_stable_pair(symbol)
}
