use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use common::{Error, Result};

use crate::{CoinMetadata, Listing, MarketCapSource};

const BASE_URL: &str = "https://pro-api.coinmarketcap.com";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// REST API client for CoinMarketCap's pro API.
pub struct CmcClient {
    api_key: String,
    http: Client,
}

impl CmcClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
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
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::MarketCap(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl MarketCapSource for CmcClient {
    async fn total_market_cap(&self) -> Result<Option<f64>> {
        let body = self.get("/v1/global-metrics/quotes/latest", &[]).await?;
        let result: GlobalMetricsResult =
            serde_json::from_str(&body).map_err(|e| Error::MarketCap(e.to_string()))?;

        Ok(result
            .data
            .and_then(|d| d.quote)
            .and_then(|q| q.usd)
            .and_then(|u| u.total_market_cap))
    }

    async fn top_listings(&self, limit: usize) -> Result<Vec<Listing>> {
        let query = vec![
            ("limit", limit.to_string()),
            ("sort", "market_cap".to_string()),
            ("sort_dir", "desc".to_string()),
        ];
        let body = self.get("/v1/cryptocurrency/listings/latest", &query).await?;
        let result: ListingsResult =
            serde_json::from_str(&body).map_err(|e| Error::MarketCap(e.to_string()))?;

        Ok(result
            .data
            .into_iter()
            .filter_map(|d| {
                let symbol = d.symbol.filter(|s| !s.trim().is_empty())?;
                let market_cap = d.quote.and_then(|q| q.usd).and_then(|u| u.market_cap)?;
                Some(Listing {
                    id: d.id,
                    symbol,
                    market_cap,
                })
            })
            .collect())
    }

    async fn coin_metadata(&self, ids: &[i64]) -> Result<Vec<CoinMetadata>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let query = vec![("id", id_list), ("aux", "notice".to_string())];
        let body = self.get("/v2/cryptocurrency/info", &query).await?;
        let result: InfoResult =
            serde_json::from_str(&body).map_err(|e| Error::MarketCap(e.to_string()))?;

        Ok(result
            .data
            .into_values()
            .map(|info| CoinMetadata {
                id: info.id,
                symbol: info.symbol,
                notice: info.notice.unwrap_or_default(),
            })
            .collect())
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GlobalMetricsResult {
    data: Option<GlobalMetricsData>,
}

#[derive(Deserialize)]
struct GlobalMetricsData {
    quote: Option<QuoteBlock>,
}

#[derive(Deserialize)]
struct QuoteBlock {
    #[serde(rename = "USD")]
    usd: Option<UsdQuote>,
}

#[derive(Deserialize)]
struct UsdQuote {
    #[serde(default)]
    total_market_cap: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
}

#[derive(Deserialize)]
struct ListingsResult {
    #[serde(default)]
    data: Vec<ListingEntry>,
}

#[derive(Deserialize)]
struct ListingEntry {
    id: i64,
    symbol: Option<String>,
    quote: Option<QuoteBlock>,
}

#[derive(Deserialize)]
struct InfoResult {
    #[serde(default)]
    data: HashMap<String, InfoEntry>,
}

#[derive(Deserialize)]
struct InfoEntry {
    id: i64,
    symbol: String,
    #[serde(default)]
    notice: Option<String>,
}
