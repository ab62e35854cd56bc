use async_trait::async_trait;

use crate::{BacktestRecord, Result, SelectionFilter, SymbolCandidate, SymbolPerformance};

/// Produces the ranked symbol universe for one backtest cycle.
#[async_trait]
pub trait SymbolSource: Send + Sync {
    async fn select(&self, filter: &SelectionFilter) -> Result<Vec<SymbolCandidate>>;
}

/// Controls the single exclusive backtest job on the job substrate.
///
/// All three operations are infallible at the signature level: failures are
/// logged by the implementation and collapse to `false` (start/stop) or
/// "assume still running" (`has_exited`).
#[async_trait]
pub trait JobController: Send + Sync {
    /// Stop whatever is running, persist the job spec payload, then create
    /// and start a new job for `config_id`. Returns whether the start took.
    async fn start(&self, config_id: &str, job_config: &str) -> bool;

    /// Stop and remove every owned job instance. Idempotent.
    async fn stop(&self) -> bool;

    /// Whether no owned job instance is still running. Errors read as
    /// "still running" — a false exit is never reported.
    async fn has_exited(&self) -> bool;
}

/// Reads the completed job's output tree.
#[async_trait]
pub trait ResultHarvester: Send + Sync {
    /// Remove stale output from previous runs.
    async fn purge(&self) -> Result<()>;

    /// Parse every per-symbol result record the job produced.
    async fn harvest(&self) -> Result<Vec<BacktestRecord>>;
}

/// Persistent store for per-strategy runs, keyed by strategy name,
/// last-write-wins.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, strategy: &str, data: Vec<SymbolPerformance>) -> Result<()>;

    async fn load(&self, strategy: &str) -> Result<Option<Vec<SymbolPerformance>>>;
}
