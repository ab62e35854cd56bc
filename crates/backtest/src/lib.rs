mod config;
mod harvest;
mod jobspec;
mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use tokio::time::Instant;
use tracing::{error, info, warn};

use common::backtest::{JobController, ResultHarvester, ResultStore, SymbolSource};
use common::{Error, Result, SelectionFilter, SymbolPerformance};

pub use config::{StrategiesFile, StrategyConfig};
pub use harvest::PlotsHarvester;
pub use jobspec::JobSpec;
pub use store::FileResultStore;

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Drives the whole backtest pass: per strategy, select the symbol
/// universe, run the job to completion, harvest and persist the results.
/// One pass covers every configured strategy; a failing strategy is logged
/// and the remaining strategies still run. A pass with any failure
/// schedules a short retry instead of the full interval.
pub struct BacktestService {
    symbols: Arc<dyn SymbolSource>,
    job: Arc<dyn JobController>,
    harvester: Arc<dyn ResultHarvester>,
    store: Arc<dyn ResultStore>,
    strategies: StrategiesFile,
}

impl BacktestService {
    pub fn new(
        symbols: Arc<dyn SymbolSource>,
        job: Arc<dyn JobController>,
        harvester: Arc<dyn ResultHarvester>,
        store: Arc<dyn ResultStore>,
        strategies: StrategiesFile,
    ) -> Self {
        Self {
            symbols,
            job,
            harvester,
            store,
            strategies,
        }
    }

    /// Run forever. Call from `tokio::spawn`.
    pub async fn run(self) {
        let interval = Duration::from_secs(self.strategies.interval_hours * 3600);
        loop {
            let delay = match self.run_pass().await {
                Ok(()) => {
                    info!("Backtest pass complete");
                    interval
                }
                Err(e) => {
                    error!(error = %e, "Backtest pass had failures; retrying shortly");
                    RETRY_DELAY
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// Run every configured strategy once. A strategy failure never blocks
    /// the strategies after it; the pass reports an error if any failed.
    pub async fn run_pass(&self) -> Result<()> {
        let mut failed = 0usize;
        for strategy in &self.strategies.strategies {
            info!(strategy = %strategy.name, "Starting backtest cycle");
            if let Err(e) = self.run_strategy(strategy).await {
                error!(strategy = %strategy.name, error = %e, "Backtest cycle failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(Error::Other(format!(
                "{failed} of {} strategy cycles failed",
                self.strategies.strategies.len()
            )));
        }
        Ok(())
    }

    pub async fn run_strategy(&self, strategy: &StrategyConfig) -> Result<()> {
        // Day-aligned windows: the current partial day never enters the
        // selection statistics or the rendered job dates.
        let today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let filter = SelectionFilter {
            min_launch_time: today - ChronoDuration::days(strategy.launch_days),
            window_start: today - ChronoDuration::days(strategy.backtest_days),
            window_end: today,
            top_volume_percentile: strategy.top_volume_percentile,
            market_cap_filter: strategy.market_cap_filter,
            min_market_cap_ratio: strategy.min_market_cap_ratio,
        };

        let candidates = self.symbols.select(&filter).await?;
        if candidates.is_empty() {
            return Err(Error::DataIntegrity(format!(
                "strategy '{}': no symbols selected",
                strategy.name
            )));
        }
        let symbols: Vec<String> = candidates.iter().map(|c| c.symbol.clone()).collect();
        info!(strategy = %strategy.name, count = symbols.len(), "Symbols selected");

        self.harvester.purge().await?;

        let spec = JobSpec::new(symbols, filter.window_start, filter.window_end);
        if !self.job.start(&strategy.job_config, &spec.render()?).await {
            return Err(Error::Other(format!(
                "strategy '{}': job failed to start",
                strategy.name
            )));
        }

        self.await_completion(strategy).await?;
        self.job.stop().await;

        let records = self.harvester.harvest().await?;
        if records.len() != candidates.len() {
            return Err(Error::DataIntegrity(format!(
                "strategy '{}': expected {} results, found {}",
                strategy.name,
                candidates.len(),
                records.len()
            )));
        }

        let mut by_symbol: HashMap<String, common::BacktestRecord> = records
            .into_iter()
            .filter_map(|r| r.result.symbol.clone().map(|s| (s, r)))
            .collect();
        let mut performances = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(record) = by_symbol.remove(&candidate.symbol) else {
                return Err(Error::DataIntegrity(format!(
                    "strategy '{}': no result for symbol {}",
                    strategy.name, candidate.symbol
                )));
            };
            performances.push(SymbolPerformance {
                symbol: candidate.symbol,
                volatility: candidate.volatility,
                median_volume: candidate.median_volume,
                max_leverage: candidate.max_leverage,
                min_quantity: candidate.min_quantity,
                min_notional_value: candidate.min_notional_value,
                last_price: candidate.last_price,
                copy_trade_enabled: candidate.copy_trade_enabled,
                result: record,
            });
        }

        self.store.save(&strategy.name, performances).await?;
        info!(strategy = %strategy.name, "Backtest cycle complete");
        Ok(())
    }

    /// Poll until the job exits, enforcing the configured runtime ceiling.
    async fn await_completion(&self, strategy: &StrategyConfig) -> Result<()> {
        let deadline =
            Instant::now() + Duration::from_secs(self.strategies.max_execution_hours * 3600);
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if self.job.has_exited().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(strategy = %strategy.name, "Job exceeded runtime ceiling; stopping it");
                self.job.stop().await;
                return Err(Error::Timeout(format!(
                    "strategy '{}': job exceeded {}h",
                    strategy.name, self.strategies.max_execution_hours
                )));
            }
        }
    }
}
