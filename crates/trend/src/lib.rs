mod macd;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::symbols::{is_traded_symbol, normalize_coin};
use common::{CandleInterval, ExchangeData, Result, SymbolTrend, Trend, TrendVerdict};
use marketcap::MarketDataCache;

pub use macd::MacdIndicator;

/// Pause between per-symbol candle fetches.
const CANDLE_FETCH_DELAY: Duration = Duration::from_secs(1);
/// Stop scanning once this many symbols classified as bullish or bearish.
const CLASSIFIED_TARGET: usize = 100;
/// Bars below this are not enough signal to classify.
const MIN_CANDLES: usize = 50;
/// Window sized so a full-history symbol yields this many 4h bars.
const OPTIMAL_CANDLES: i64 = 500;
const CANDLE_PAGE_LIMIT: usize = 1000;

/// Latest verdict, replaced wholesale each aggregation cycle.
#[derive(Default)]
pub struct TrendStore {
    inner: RwLock<Option<TrendVerdict>>,
}

impl TrendStore {
    pub async fn set(&self, verdict: TrendVerdict) {
        *self.inner.write().await = Some(verdict);
    }

    pub async fn get(&self) -> Option<TrendVerdict> {
        self.inner.read().await.clone()
    }
}

/// Classifies the broad market as bullish or bearish by running MACD over
/// the top coins by market capitalization.
pub struct TrendAggregator {
    exchange: Arc<dyn ExchangeData>,
    market_cap: Arc<MarketDataCache>,
    indicator: MacdIndicator,
}

impl TrendAggregator {
    pub fn new(exchange: Arc<dyn ExchangeData>, market_cap: Arc<MarketDataCache>) -> Self {
        Self {
            exchange,
            market_cap,
            indicator: MacdIndicator::new(12, 26, 9),
        }
    }

    /// One full aggregation cycle.
    ///
    /// No market-cap snapshot or no tradeable tickers produces an Unknown
    /// verdict with zero counts. A candle fetch failure mid-scan is an
    /// `Err` so the caller keeps the previous verdict and retries.
    pub async fn compute_trend(&self) -> Result<TrendVerdict> {
        let Some(snapshot) = self.market_cap.snapshot().await else {
            warn!("No market capitalization data; trend is unknown");
            return Ok(TrendVerdict::unknown());
        };

        let tickers = self.exchange.tickers().await?;
        let mut symbol_by_coin: HashMap<String, String> = HashMap::new();
        for ticker in tickers {
            if !is_traded_symbol(&ticker.symbol) {
                continue;
            }
            // First occurrence wins; scaled variants map to one coin.
            symbol_by_coin
                .entry(normalize_coin(&ticker.symbol))
                .or_insert(ticker.symbol);
        }
        if symbol_by_coin.is_empty() {
            warn!("No tradeable tickers; trend is unknown");
            return Ok(TrendVerdict::unknown());
        }

        let mut ranked: Vec<(&String, &f64)> = snapshot.cap_by_symbol.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));

        let window_start = Utc::now() - ChronoDuration::hours(4 * OPTIMAL_CANDLES);
        let mut per_symbol = Vec::new();
        let mut classified = 0usize;
        for (coin, _) in ranked {
            if classified >= CLASSIFIED_TARGET {
                break;
            }
            let Some(symbol) = symbol_by_coin.get(coin) else {
                continue;
            };

            let candles = self
                .exchange
                .candles(
                    symbol,
                    CandleInterval::FourHours,
                    window_start,
                    Utc::now(),
                    CANDLE_PAGE_LIMIT,
                )
                .await?;

            let trend = if candles.len() < MIN_CANDLES {
                Trend::Unknown
            } else {
                let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                match self.indicator.latest(&closes) {
                    Some((macd, signal)) if macd > signal => Trend::Bullish,
                    Some(_) => Trend::Bearish,
                    None => Trend::Unknown,
                }
            };
            if trend != Trend::Unknown {
                classified += 1;
            }
            per_symbol.push(SymbolTrend {
                symbol: symbol.clone(),
                trend,
            });

            tokio::time::sleep(CANDLE_FETCH_DELAY).await;
        }

        let bullish_count = per_symbol.iter().filter(|s| s.trend == Trend::Bullish).count();
        let bearish_count = per_symbol.iter().filter(|s| s.trend == Trend::Bearish).count();
        let unknown_count = per_symbol.len() - bullish_count - bearish_count;
        let global_trend = if bullish_count > bearish_count {
            Trend::Bullish
        } else {
            Trend::Bearish
        };

        info!(
            bullish = bullish_count,
            bearish = bearish_count,
            unknown = unknown_count,
            trend = %global_trend,
            "Market trend computed"
        );
        Ok(TrendVerdict {
            global_trend,
            bullish_count,
            bearish_count,
            unknown_count,
            per_symbol,
            computed_at: Utc::now(),
        })
    }

    /// Run forever, publishing each verdict to `store`. Call from
    /// `tokio::spawn`. A failed cycle keeps the stored verdict.
    pub async fn run(self, store: Arc<TrendStore>, interval: Duration) {
        loop {
            match self.compute_trend().await {
                Ok(verdict) => store.set(verdict).await,
                Err(e) => warn!(error = %e, "Trend aggregation failed; keeping last verdict"),
            }
            tokio::time::sleep(interval).await;
        }
    }
}
