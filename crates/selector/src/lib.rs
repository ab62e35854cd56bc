pub mod delisting;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use common::backtest::SymbolSource;
use common::symbols::{is_stable_pair, normalize_coin, QUOTE_ASSET};
use common::{
    Candle, CandleInterval, Error, ExchangeData, InstrumentInfo, MarketSnapshot, Result,
    SelectionFilter, SymbolCandidate,
};
use marketcap::MarketDataCache;

/// Pause between per-symbol candle fetches to respect exchange rate limits.
const CANDLE_FETCH_DELAY: Duration = Duration::from_millis(100);
const ANNOUNCEMENT_PAGE_LIMIT: usize = 100;
const CANDLE_PAGE_LIMIT: usize = 1000;

/// Multi-stage symbol selection pipeline: blacklist and delisting
/// exclusion, instrument filtering, per-symbol volatility/volume analysis,
/// volume-percentile ranking, and an optional market-cap-ratio cut.
pub struct SymbolSelector {
    exchange: Arc<dyn ExchangeData>,
    market_cap: Arc<MarketDataCache>,
    blacklist: Vec<String>,
}

impl SymbolSelector {
    pub fn new(
        exchange: Arc<dyn ExchangeData>,
        market_cap: Arc<MarketDataCache>,
        blacklist: Vec<String>,
    ) -> Self {
        Self {
            exchange,
            market_cap,
            blacklist,
        }
    }

    /// Produce the ranked candidate list for one backtest cycle.
    ///
    /// Fails when the ticker or instrument listing errors or comes back
    /// empty, and when the market-cap filter is requested but no snapshot
    /// is available. Result order is median-volume descending.
    pub async fn select(&self, filter: &SelectionFilter) -> Result<Vec<SymbolCandidate>> {
        let blacklist: HashSet<String> = self
            .blacklist
            .iter()
            .map(|symbol| normalize_coin(symbol))
            .collect();

        let announcements = self
            .exchange
            .announcements(delisting::ANNOUNCEMENT_TYPE, ANNOUNCEMENT_PAGE_LIMIT)
            .await?;
        let delistings =
            delisting::delisted_symbols(&announcements, chrono::Utc::now(), delisting::LOOKBACK_DAYS);
        if !delistings.is_empty() {
            info!(symbols = ?delistings, "Excluding recently delisted symbols");
        }

        let tickers = self.exchange.tickers().await?;
        if tickers.is_empty() {
            return Err(Error::Exchange("no ticker data returned".into()));
        }
        let last_price_by_symbol: HashMap<String, f64> = tickers
            .into_iter()
            .map(|t| (t.symbol, t.last_price))
            .collect();

        let snapshot = if filter.market_cap_filter {
            // A missing snapshot is a hard failure for a cap-filtered run.
            Some(self.market_cap.snapshot().await.ok_or_else(|| {
                Error::MarketCap("no market capitalization data available".into())
            })?)
        } else {
            None
        };

        let instruments = self
            .list_instruments(filter, &delistings, &blacklist, snapshot.as_deref())
            .await?;

        let mut candidates = Vec::new();
        for instrument in &instruments {
            let Some(&last_price) = last_price_by_symbol.get(&instrument.symbol) else {
                warn!(symbol = %instrument.symbol, "Instrument has no ticker; skipped");
                continue;
            };
            let candles = self
                .exchange
                .candles(
                    &instrument.symbol,
                    CandleInterval::OneDay,
                    filter.window_start,
                    filter.window_end,
                    CANDLE_PAGE_LIMIT,
                )
                .await?;
            if let Some(candidate) = analyze_symbol(instrument, last_price, &candles) {
                candidates.push(candidate);
            }
            tokio::time::sleep(CANDLE_FETCH_DELAY).await;
        }

        candidates.sort_by(|a, b| {
            b.median_volume
                .partial_cmp(&a.median_volume)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(percentile_cutoff(
            candidates.len(),
            filter.top_volume_percentile,
        ));

        if let Some(snapshot) = snapshot.as_deref() {
            candidates.retain(|c| !is_filtered_by_market_cap(snapshot, &c.symbol, filter));
        }

        debug!(count = candidates.len(), "Symbol selection complete");
        Ok(candidates)
    }

    /// Page through the instrument listing, applying every per-instrument
    /// exclusion rule.
    async fn list_instruments(
        &self,
        filter: &SelectionFilter,
        delistings: &HashSet<String>,
        blacklist: &HashSet<String>,
        snapshot: Option<&MarketSnapshot>,
    ) -> Result<Vec<InstrumentInfo>> {
        let mut instruments = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.exchange.instruments(cursor.as_deref()).await?;
            for instrument in page.instruments {
                if instrument.status != "Trading" {
                    continue;
                }
                if instrument.quote_asset != QUOTE_ASSET {
                    continue;
                }
                if is_stable_pair(&instrument.symbol) {
                    continue;
                }
                if instrument.launch_time > filter.min_launch_time {
                    continue;
                }
                if instrument.max_leverage.is_none() || instrument.min_order_qty.is_none() {
                    continue;
                }
                if instrument.min_notional_value.is_none() {
                    continue;
                }
                if delistings.contains(&instrument.symbol) {
                    continue;
                }
                let coin = normalize_coin(&instrument.symbol);
                if let Some(snapshot) = snapshot {
                    let has_notice = snapshot
                        .notice_by_symbol
                        .get(&coin)
                        .is_some_and(|notice| !notice.is_empty());
                    if has_notice {
                        debug!(symbol = %instrument.symbol, "Excluded by provider notice");
                        continue;
                    }
                }
                if blacklist.contains(&coin) {
                    continue;
                }
                instruments.push(instrument);
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        if instruments.is_empty() {
            return Err(Error::Exchange("no tradeable instruments returned".into()));
        }
        Ok(instruments)
    }
}

#[async_trait]
impl SymbolSource for SymbolSelector {
    async fn select(&self, filter: &SelectionFilter) -> Result<Vec<SymbolCandidate>> {
        SymbolSelector::select(self, filter).await
    }
}

/// Build a candidate from one symbol's daily candles. Returns `None` for
/// empty windows and non-positive volatility.
fn analyze_symbol(
    instrument: &InstrumentInfo,
    last_price: f64,
    candles: &[Candle],
) -> Option<SymbolCandidate> {
    if candles.is_empty() {
        return None;
    }
    let volatility = mean_range_volatility(candles);
    if volatility <= 0.0 {
        return None;
    }
    Some(SymbolCandidate {
        symbol: instrument.symbol.clone(),
        volatility,
        median_volume: median_quote_volume(candles),
        max_leverage: instrument.max_leverage.unwrap_or(0.0),
        min_quantity: instrument.min_order_qty.unwrap_or(0.0),
        min_notional_value: instrument.min_notional_value.unwrap_or(0.0),
        last_price,
        copy_trade_enabled: instrument.copy_trade_enabled,
    })
}

/// Mean of per-candle `(high - low) / |low| * 100` over the window.
fn mean_range_volatility(candles: &[Candle]) -> f64 {
    let n = candles.len() as f64;
    candles
        .iter()
        .map(|c| (c.high - c.low) / c.low.abs() * 100.0 / n)
        .sum()
}

/// Median per-candle quote volume, taking index `n / 2` of the sorted
/// window (even-length windows use the lower-middle element).
fn median_quote_volume(candles: &[Candle]) -> f64 {
    let mut volumes: Vec<f64> = candles.iter().map(|c| c.quote_volume).collect();
    volumes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    volumes[volumes.len() / 2]
}

/// Truncating percentile cutoff, never below one.
fn percentile_cutoff(count: usize, percentile: f64) -> usize {
    let cutoff = (count as f64 * percentile) as usize;
    cutoff.max(1)
}

fn is_filtered_by_market_cap(
    snapshot: &MarketSnapshot,
    symbol: &str,
    filter: &SelectionFilter,
) -> bool {
    if !filter.market_cap_filter {
        return false;
    }
    let coin = normalize_coin(symbol);
    match snapshot.cap_ratio_by_symbol.get(&coin) {
        Some(&ratio) => ratio < filter.min_market_cap_ratio,
        // No ratio entry means filtered out, not an error.
        None => true,
    }
}
