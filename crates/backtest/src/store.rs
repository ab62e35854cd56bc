use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use common::backtest::ResultStore;
use common::{Result, SymbolPerformance};

#[derive(Debug, Serialize, Deserialize, Default)]
struct ResultsFile {
    strategies: Vec<StrategyEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StrategyEntry {
    name: String,
    symbol_data: Vec<SymbolPerformance>,
}

/// Single-file JSON store for strategy runs. The file is read once on
/// first access and rewritten whole on every save; a mutex serializes
/// access so saves from the orchestrator and reads from the API never
/// interleave mid-write.
pub struct FileResultStore {
    path: PathBuf,
    cache: Mutex<Option<ResultsFile>>,
}

impl FileResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    async fn load_file(&self) -> Result<ResultsFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            // A missing file is an empty store.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ResultsFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ResultStore for FileResultStore {
    async fn save(&self, strategy: &str, data: Vec<SymbolPerformance>) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut file = match cache.take() {
            Some(file) => file,
            None => self.load_file().await?,
        };

        match file.strategies.iter_mut().find(|e| e.name == strategy) {
            Some(entry) => entry.symbol_data = data,
            None => file.strategies.push(StrategyEntry {
                name: strategy.to_string(),
                symbol_data: data,
            }),
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&file)?).await?;
        info!(strategy = %strategy, path = %self.path.display(), "Strategy results saved");
        *cache = Some(file);
        Ok(())
    }

    async fn load(&self, strategy: &str) -> Result<Option<Vec<SymbolPerformance>>> {
        let mut cache = self.cache.lock().await;
        let file = match cache.take() {
            Some(file) => file,
            None => self.load_file().await?,
        };
        let data = file
            .strategies
            .iter()
            .find(|e| e.name == strategy)
            .map(|e| e.symbol_data.clone());
        *cache = Some(file);
        Ok(data)
    }
}
