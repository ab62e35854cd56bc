mod cmc;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use common::{MarketSnapshot, Result};

pub use cmc::CmcClient;

/// One row of the provider's cap-ranked listing.
#[derive(Debug, Clone)]
pub struct Listing {
    pub id: i64,
    pub symbol: String,
    pub market_cap: f64,
}

/// Per-coin metadata resolved by id after the listing call.
#[derive(Debug, Clone)]
pub struct CoinMetadata {
    pub id: i64,
    pub symbol: String,
    pub notice: String,
}

/// Abstraction over the market-capitalization data provider.
/// `CmcClient` implements this for production; tests substitute counting
/// fakes to pin down the cache's single-flight behavior.
#[async_trait]
pub trait MarketCapSource: Send + Sync {
    async fn total_market_cap(&self) -> Result<Option<f64>>;

    /// Top `limit` coins by capitalization, ranked descending.
    async fn top_listings(&self, limit: usize) -> Result<Vec<Listing>>;

    /// Batched metadata lookup by provider id.
    async fn coin_metadata(&self, ids: &[i64]) -> Result<Vec<CoinMetadata>>;
}

struct Slot {
    snapshot: Option<Arc<MarketSnapshot>>,
    refreshed_at: Option<Instant>,
}

/// Time-boxed, single-flight cache over [`MarketCapSource`].
///
/// The freshness decision and the fetch itself run under one lock, so
/// concurrent callers during a refresh all observe either the pre-refresh
/// or post-refresh snapshot and at most one upstream fetch is ever in
/// flight. Fetch failures are never surfaced to callers; the previous
/// snapshot (possibly `None`) is returned instead.
pub struct MarketDataCache {
    source: Box<dyn MarketCapSource>,
    /// False when no API credential is configured; disables fetching.
    enabled: bool,
    ttl: Duration,
    coin_limit: usize,
    slot: Mutex<Slot>,
}

impl MarketDataCache {
    pub fn new(
        source: Box<dyn MarketCapSource>,
        enabled: bool,
        ttl: Duration,
        coin_limit: usize,
    ) -> Self {
        Self {
            source,
            enabled,
            ttl,
            coin_limit,
            slot: Mutex::new(Slot {
                snapshot: None,
                refreshed_at: None,
            }),
        }
    }

    /// Current snapshot, refreshed through the source when older than the
    /// TTL. `None` only when no fetch has ever succeeded.
    pub async fn snapshot(&self) -> Option<Arc<MarketSnapshot>> {
        if !self.enabled {
            warn!("Market cap API key is not set; serving stale data only");
            return self.slot.lock().await.snapshot.clone();
        }

        let mut slot = self.slot.lock().await;
        if let (Some(snapshot), Some(refreshed_at)) = (&slot.snapshot, slot.refreshed_at) {
            if refreshed_at.elapsed() < self.ttl {
                return Some(snapshot.clone());
            }
        }

        match self.refresh().await {
            Some(snapshot) => {
                slot.snapshot = Some(snapshot.clone());
                slot.refreshed_at = Some(Instant::now());
                Some(snapshot)
            }
            // Keep the stale value; the next call will try again.
            None => slot.snapshot.clone(),
        }
    }

    async fn refresh(&self) -> Option<Arc<MarketSnapshot>> {
        info!("Refreshing market capitalization data");
        let (total, listings) = tokio::join!(
            self.source.total_market_cap(),
            self.source.top_listings(self.coin_limit),
        );

        let total_cap = match total {
            Ok(Some(total)) => total,
            Ok(None) => {
                warn!("Market cap refresh failed: no total market cap returned");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Market cap refresh failed: total market cap");
                return None;
            }
        };
        let listings = match listings {
            Ok(listings) if !listings.is_empty() => listings,
            Ok(_) => {
                warn!("Market cap refresh failed: empty listing");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Market cap refresh failed: listing");
                return None;
            }
        };

        // First occurrence wins on duplicate symbols.
        let mut cap_by_symbol: HashMap<String, f64> = HashMap::new();
        let mut ids = Vec::with_capacity(listings.len());
        for listing in &listings {
            if !cap_by_symbol.contains_key(&listing.symbol) {
                cap_by_symbol.insert(listing.symbol.clone(), listing.market_cap);
                ids.push(listing.id);
            }
        }

        let mut notice_by_symbol: HashMap<String, String> = cap_by_symbol
            .keys()
            .map(|symbol| (symbol.clone(), String::new()))
            .collect();
        match self.source.coin_metadata(&ids).await {
            Ok(metadata) => {
                for coin in metadata {
                    if let Some(notice) = notice_by_symbol.get_mut(&coin.symbol) {
                        *notice = coin.notice;
                    }
                }
            }
            // Non-fatal; symbols keep an empty notice.
            Err(e) => warn!(error = %e, "Failed to fetch coin metadata"),
        }

        let cap_ratio_by_symbol = cap_by_symbol
            .iter()
            .map(|(symbol, cap)| (symbol.clone(), cap / total_cap))
            .collect();

        let snapshot = MarketSnapshot {
            total_cap,
            cap_by_symbol,
            cap_ratio_by_symbol,
            notice_by_symbol,
            fetched_at: Utc::now(),
        };
        info!(
            total_cap = snapshot.total_cap,
            coins = snapshot.cap_by_symbol.len(),
            "Market capitalization data updated"
        );
        Some(Arc::new(snapshot))
    }
}
