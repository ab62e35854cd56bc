use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use common::backtest::ResultHarvester;
use common::{BacktestRecord, Error, Result};

const PLOTS_DIR: &str = "plots";
const RESULT_FILE: &str = "result.json";

/// Reads the job's output tree: one directory per symbol, each holding a
/// `plots/` directory with one timestamped run directory per execution.
pub struct PlotsHarvester {
    base: PathBuf,
}

impl PlotsHarvester {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Latest run directory under one symbol's `plots/`, by name. Run
    /// directories are timestamp-named, so lexicographic order is
    /// chronological.
    async fn latest_run_dir(plots: &Path) -> Result<Option<PathBuf>> {
        let mut runs = Vec::new();
        let mut entries = tokio::fs::read_dir(plots).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                runs.push(entry.path());
            }
        }
        runs.sort();
        Ok(runs.pop())
    }
}

#[async_trait]
impl ResultHarvester for PlotsHarvester {
    async fn purge(&self) -> Result<()> {
        if !self.base.exists() {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(&self.base).await?;
        while let Some(entry) = entries.next_entry().await? {
            let plots = entry.path().join(PLOTS_DIR);
            if plots.is_dir() {
                debug!(path = %plots.display(), "Purging stale output");
                tokio::fs::remove_dir_all(&plots).await?;
            }
        }
        Ok(())
    }

    async fn harvest(&self) -> Result<Vec<BacktestRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base)
            .await
            .map_err(|e| Error::Other(format!("output tree '{}': {e}", self.base.display())))?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let plots = entry.path().join(PLOTS_DIR);
            if !plots.is_dir() {
                continue;
            }
            let Some(run) = Self::latest_run_dir(&plots).await? else {
                warn!(path = %plots.display(), "Symbol has no run directory");
                continue;
            };
            let raw = tokio::fs::read_to_string(run.join(RESULT_FILE)).await?;
            let record: BacktestRecord = serde_json::from_str(&strip_nan_lines(&raw))?;
            records.push(record);
        }
        Ok(records)
    }
}

/// The job emits bare `NaN` literals for stats it could not compute, which
/// is not valid JSON. Those lines carry no usable value; drop them.
fn strip_nan_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_end().ends_with("NaN,"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_result(dir: &Path, symbol: &str, run: &str, body: &str) {
        let run_dir = dir.join(symbol).join(PLOTS_DIR).join(run);
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join(RESULT_FILE), body).unwrap();
    }

    #[tokio::test]
    async fn harvest_reads_latest_run_per_symbol() {
        let dir = tempfile::tempdir().unwrap();
        write_result(
            dir.path(),
            "BTCUSDT",
            "2024-01-01T000000",
            r#"{"result": {"symbol": "BTCUSDT", "adg_long": 0.001}}"#,
        );
        write_result(
            dir.path(),
            "BTCUSDT",
            "2024-02-01T000000",
            r#"{"result": {"symbol": "BTCUSDT", "adg_long": 0.002}}"#,
        );

        let harvester = PlotsHarvester::new(dir.path());
        let records = harvester.harvest().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result.adg_long, Some(0.002));
    }

    #[tokio::test]
    async fn harvest_strips_nan_lines() {
        let dir = tempfile::tempdir().unwrap();
        let body = "{\n  \"result\": {\n    \"symbol\": \"ETHUSDT\",\n    \"adg_short\": NaN,\n    \"adg_long\": 0.003\n  }\n}";
        write_result(dir.path(), "ETHUSDT", "run", body);

        let harvester = PlotsHarvester::new(dir.path());
        let records = harvester.harvest().await.unwrap();
        assert_eq!(records[0].result.symbol.as_deref(), Some("ETHUSDT"));
        assert_eq!(records[0].result.adg_long, Some(0.003));
        assert_eq!(records[0].result.adg_short, None);
    }

    #[tokio::test]
    async fn purge_removes_plots_but_keeps_symbol_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), "BTCUSDT", "run", "{}");
        std::fs::write(dir.path().join("BTCUSDT").join("cache.npy"), b"x").unwrap();

        let harvester = PlotsHarvester::new(dir.path());
        harvester.purge().await.unwrap();

        assert!(!dir.path().join("BTCUSDT").join(PLOTS_DIR).exists());
        assert!(dir.path().join("BTCUSDT").join("cache.npy").exists());
    }

    #[tokio::test]
    async fn purge_of_missing_base_is_a_noop() {
        let harvester = PlotsHarvester::new("/nonexistent/output/tree");
        assert!(harvester.purge().await.is_ok());
    }

    #[tokio::test]
    async fn harvest_of_missing_base_is_an_error() {
        let harvester = PlotsHarvester::new("/nonexistent/output/tree");
        assert!(harvester.harvest().await.is_err());
    }
}
