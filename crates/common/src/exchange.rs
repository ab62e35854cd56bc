use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Announcement, Candle, CandleInterval, InstrumentPage, Result, TickerInfo};

/// Abstraction over the exchange's public market-data endpoints.
///
/// `BybitClient` in `crates/exchange` implements this for production; tests
/// substitute in-memory fakes. All calls surface upstream failures as
/// explicit errors — callers decide what is fatal.
#[async_trait]
pub trait ExchangeData: Send + Sync {
    /// Latest-price tickers for every linear perpetual.
    async fn tickers(&self) -> Result<Vec<TickerInfo>>;

    /// One page of the tradeable-instrument listing. Pass the cursor from
    /// the previous page to continue; `None` starts from the beginning.
    async fn instruments(&self, cursor: Option<&str>) -> Result<InstrumentPage>;

    /// OHLCV candles for a symbol over `[start, end]`, oldest first.
    async fn candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Recent announcements of the given type, newest first.
    async fn announcements(&self, announcement_type: &str, limit: usize)
        -> Result<Vec<Announcement>>;
}
