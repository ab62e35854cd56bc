use chrono::{DateTime, Utc};
use serde::Serialize;

use common::Result;

/// The job spec consumed by the backtest container. Serialized as
/// pretty-printed JSON, which the job's HJSON reader accepts verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct JobSpec {
    pub market_type: String,
    pub user: String,
    pub symbols: Vec<String>,
    pub latency_simulation_ms: u64,
    pub starting_balance: f64,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`
    pub end_date: String,
    pub slim_analysis: bool,
    pub base_dir: String,
    pub ohlcv: bool,
    pub adg_n_subdivisions: u32,
    pub enable_interactive_plot: bool,
    pub plot_theme: String,
    pub plot_candles_interval: String,
}

impl JobSpec {
    pub fn new(symbols: Vec<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            market_type: "futures".to_string(),
            user: "bybit_01".to_string(),
            symbols,
            latency_simulation_ms: 1000,
            starting_balance: 100_000.0,
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            slim_analysis: true,
            base_dir: "backtests".to_string(),
            ohlcv: true,
            adg_n_subdivisions: 1,
            enable_interactive_plot: false,
            plot_theme: "light".to_string(),
            plot_candles_interval: "1m".to_string(),
        }
    }

    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
