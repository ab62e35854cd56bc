use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{
    Announcement, Candle, CandleInterval, Error, ExchangeData, InstrumentInfo, InstrumentPage,
    Result, TickerInfo,
};

const BASE_URL: &str = "https://api.bybit.com";
const CATEGORY: &str = "linear";
const PAGE_SIZE: usize = 1000;

/// REST API client for Bybit v5 public market data. All endpoints used here
/// are unauthenticated.
pub struct BybitClient {
    http: Client,
}

impl Default for BybitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BybitClient {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{BASE_URL}{path}");
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    /// Deserialize a v5 envelope and reject non-zero return codes.
    fn unwrap_envelope<T>(body: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let envelope: V5Response<T> =
            serde_json::from_str(body).map_err(|e| Error::Exchange(e.to_string()))?;
        if envelope.ret_code != 0 {
            return Err(Error::Exchange(format!(
                "retCode {}: {}",
                envelope.ret_code, envelope.ret_msg
            )));
        }
        envelope
            .result
            .ok_or_else(|| Error::Exchange("no data returned".to_string()))
    }
}

#[async_trait]
impl ExchangeData for BybitClient {
    async fn tickers(&self) -> Result<Vec<TickerInfo>> {
        let body = self
            .get(
                "/v5/market/tickers",
                &[("category", CATEGORY.to_string())],
            )
            .await?;
        let result: TickerResult = Self::unwrap_envelope(&body)?;

        result
            .list
            .into_iter()
            .map(|t| {
                let last_price = parse_num(&t.last_price, "lastPrice")?;
                Ok(TickerInfo {
                    symbol: t.symbol,
                    last_price,
                })
            })
            .collect()
    }

    async fn instruments(&self, cursor: Option<&str>) -> Result<InstrumentPage> {
        let mut query = vec![
            ("category", CATEGORY.to_string()),
            ("status", "Trading".to_string()),
            ("limit", PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let body = self.get("/v5/market/instruments-info", &query).await?;
        let result: InstrumentResult = Self::unwrap_envelope(&body)?;

        let instruments = result
            .list
            .into_iter()
            .map(|i| {
                let launch_ms: i64 = parse_num(&i.launch_time, "launchTime")? as i64;
                Ok(InstrumentInfo {
                    symbol: i.symbol,
                    quote_asset: i.quote_coin,
                    status: i.status,
                    launch_time: timestamp_ms(launch_ms),
                    max_leverage: i
                        .leverage_filter
                        .and_then(|f| f.max_leverage.parse::<f64>().ok()),
                    min_order_qty: i
                        .lot_size_filter
                        .as_ref()
                        .and_then(|f| f.min_order_qty.parse::<f64>().ok()),
                    min_notional_value: i
                        .lot_size_filter
                        .as_ref()
                        .and_then(|f| f.min_notional_value.as_ref())
                        .and_then(|v| v.parse::<f64>().ok()),
                    copy_trade_enabled: i.copy_trading.as_deref() == Some("both"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = result
            .next_page_cursor
            .filter(|c| !c.trim().is_empty());
        Ok(InstrumentPage {
            instruments,
            next_cursor,
        })
    }

    async fn candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        debug!(symbol, ?interval, "Fetching candles");
        let query = vec![
            ("category", CATEGORY.to_string()),
            ("symbol", symbol.to_string()),
            ("interval", interval_code(interval).to_string()),
            ("start", start.timestamp_millis().to_string()),
            ("end", end.timestamp_millis().to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.get("/v5/market/kline", &query).await?;
        let result: KlineResult = Self::unwrap_envelope(&body)?;

        // The API returns newest-first; callers expect oldest-first.
        let mut candles = result
            .list
            .into_iter()
            .map(|row| {
                if row.len() < 7 {
                    return Err(Error::Exchange(format!(
                        "kline row for {symbol} has {} fields, expected 7",
                        row.len()
                    )));
                }
                Ok(Candle {
                    start: timestamp_ms(parse_num(&row[0], "startTime")? as i64),
                    open: parse_num(&row[1], "open")?,
                    high: parse_num(&row[2], "high")?,
                    low: parse_num(&row[3], "low")?,
                    close: parse_num(&row[4], "close")?,
                    volume: parse_num(&row[5], "volume")?,
                    quote_volume: parse_num(&row[6], "turnover")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }

    async fn announcements(
        &self,
        announcement_type: &str,
        limit: usize,
    ) -> Result<Vec<Announcement>> {
        let query = vec![
            ("locale", "en-US".to_string()),
            ("type", announcement_type.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.get("/v5/announcements/index", &query).await?;
        let result: AnnouncementResult = Self::unwrap_envelope(&body)?;

        Ok(result
            .list
            .into_iter()
            .map(|a| Announcement {
                title: a.title,
                published_at: timestamp_ms(a.date_timestamp),
            })
            .collect())
    }
}

fn interval_code(interval: CandleInterval) -> &'static str {
    match interval {
        CandleInterval::FourHours => "240",
        CandleInterval::OneDay => "D",
    }
}

fn timestamp_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
}

fn parse_num(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| Error::Exchange(format!("unparseable {field}: '{value}'")))
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct V5Response<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    symbol: String,
    last_price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentResult {
    list: Vec<InstrumentEntry>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentEntry {
    symbol: String,
    status: String,
    quote_coin: String,
    launch_time: String,
    leverage_filter: Option<LeverageFilter>,
    lot_size_filter: Option<LotSizeFilter>,
    #[serde(default)]
    copy_trading: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeverageFilter {
    max_leverage: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    min_order_qty: String,
    #[serde(default)]
    min_notional_value: Option<String>,
}

#[derive(Deserialize)]
struct KlineResult {
    list: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct AnnouncementResult {
    list: Vec<AnnouncementEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnouncementEntry {
    title: String,
    date_timestamp: i64,
}
