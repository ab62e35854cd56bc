use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV candle returned by the exchange, oldest-first ordering is the
/// caller's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Volume denominated in the quote asset ("turnover").
    pub quote_volume: f64,
}

/// Candle intervals the core actually requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleInterval {
    FourHours,
    OneDay,
}

/// Latest-price snapshot for a single perpetual symbol.
#[derive(Debug, Clone)]
pub struct TickerInfo {
    pub symbol: String,
    pub last_price: f64,
}

/// Tradeable instrument metadata from the exchange listing.
#[derive(Debug, Clone)]
pub struct InstrumentInfo {
    pub symbol: String,
    pub quote_asset: String,
    pub status: String,
    pub launch_time: DateTime<Utc>,
    pub max_leverage: Option<f64>,
    pub min_order_qty: Option<f64>,
    pub min_notional_value: Option<f64>,
    pub copy_trade_enabled: bool,
}

/// One page of the instrument listing. `next_cursor == None` ends pagination.
#[derive(Debug, Clone, Default)]
pub struct InstrumentPage {
    pub instruments: Vec<InstrumentInfo>,
    pub next_cursor: Option<String>,
}

/// An exchange announcement entry.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub title: String,
    pub published_at: DateTime<Utc>,
}

/// Aggregate market-capitalization data. Immutable once built; the cache
/// replaces the whole value on refresh and hands out shared references.
///
/// All maps are keyed by the market-data provider's coin symbol, which
/// matches a normalized exchange coin (see [`crate::symbols::normalize_coin`]).
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub total_cap: f64,
    pub cap_by_symbol: HashMap<String, f64>,
    /// Per-coin cap divided by `total_cap`.
    pub cap_ratio_by_symbol: HashMap<String, f64>,
    /// Regulatory/warning notices published by the provider; empty string
    /// when a coin carries none.
    pub notice_by_symbol: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

/// Per-symbol analysis produced by the selection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolCandidate {
    pub symbol: String,
    pub volatility: f64,
    pub median_volume: f64,
    pub max_leverage: f64,
    pub min_quantity: f64,
    pub min_notional_value: f64,
    pub last_price: f64,
    pub copy_trade_enabled: bool,
}

/// Input parameters for one symbol-selection run.
#[derive(Debug, Clone)]
pub struct SelectionFilter {
    /// Symbols launched after this instant are excluded.
    pub min_launch_time: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Fraction of volume-ranked survivors to keep, in `[0, 1]`.
    pub top_volume_percentile: f64,
    pub market_cap_filter: bool,
    pub min_market_cap_ratio: f64,
}

/// Lifecycle state of the single owned backtest job, re-derived from the
/// job substrate on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Starting,
    Running,
    Exited,
    StopRequested,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Starting => write!(f, "starting"),
            JobState::Running => write!(f, "running"),
            JobState::Exited => write!(f, "exited"),
            JobState::StopRequested => write!(f, "stop-requested"),
        }
    }
}

/// Directional classification of a symbol or the whole market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Unknown,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Bullish => write!(f, "bullish"),
            Trend::Bearish => write!(f, "bearish"),
            Trend::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTrend {
    pub symbol: String,
    pub trend: Trend,
}

/// Market-wide trend verdict, replaced wholesale each aggregation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendVerdict {
    pub global_trend: Trend,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub unknown_count: usize,
    pub per_symbol: Vec<SymbolTrend>,
    pub computed_at: DateTime<Utc>,
}

impl TrendVerdict {
    /// Verdict used when the market snapshot or ticker universe is
    /// unavailable: no counts, no per-symbol data.
    pub fn unknown() -> Self {
        Self {
            global_trend: Trend::Unknown,
            bullish_count: 0,
            bearish_count: 0,
            unknown_count: 0,
            per_symbol: Vec::new(),
            computed_at: Utc::now(),
        }
    }
}

/// The statistics block of a harvested `result.json`. The job writes many
/// more fields; unknown ones are ignored and absent ones default to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestStats {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub adg_long: Option<f64>,
    #[serde(default)]
    pub adg_short: Option<f64>,
    #[serde(default)]
    pub adg_per_exposure_long: Option<f64>,
    #[serde(default)]
    pub final_balance_long: Option<f64>,
    #[serde(default)]
    pub n_days: Option<f64>,
}

/// One parsed per-symbol backtest result record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestRecord {
    #[serde(default)]
    pub result: BacktestStats,
}

/// A selection candidate joined with its backtest result; the persisted
/// unit of a strategy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolPerformance {
    pub symbol: String,
    pub volatility: f64,
    pub median_volume: f64,
    pub max_leverage: f64,
    pub min_quantity: f64,
    pub min_notional_value: f64,
    pub last_price: f64,
    pub copy_trade_enabled: bool,
    pub result: BacktestRecord,
}
