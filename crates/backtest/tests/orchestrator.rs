use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use backtest::{BacktestService, StrategiesFile};
use common::backtest::{JobController, ResultHarvester, ResultStore, SymbolSource};
use common::{
    BacktestRecord, BacktestStats, Result, SelectionFilter, SymbolCandidate, SymbolPerformance,
};

fn candidate(symbol: &str) -> SymbolCandidate {
    SymbolCandidate {
        symbol: symbol.to_string(),
        volatility: 3.0,
        median_volume: 1_000_000.0,
        max_leverage: 50.0,
        min_quantity: 0.01,
        min_notional_value: 5.0,
        last_price: 100.0,
        copy_trade_enabled: true,
    }
}

fn record(symbol: &str, adg: f64) -> BacktestRecord {
    BacktestRecord {
        result: BacktestStats {
            symbol: Some(symbol.to_string()),
            adg_long: Some(adg),
            ..Default::default()
        },
    }
}

struct FakeSource {
    candidates: Vec<SymbolCandidate>,
}

#[async_trait]
impl SymbolSource for FakeSource {
    async fn select(&self, _filter: &SelectionFilter) -> Result<Vec<SymbolCandidate>> {
        Ok(self.candidates.clone())
    }
}

/// Fails the first selection, succeeds afterwards.
struct FlakySource {
    calls: AtomicUsize,
    candidates: Vec<SymbolCandidate>,
}

#[async_trait]
impl SymbolSource for FlakySource {
    async fn select(&self, _filter: &SelectionFilter) -> Result<Vec<SymbolCandidate>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(common::Error::Exchange("ticker listing unavailable".into()));
        }
        Ok(self.candidates.clone())
    }
}

#[derive(Default)]
struct CapturingSource {
    filter: Mutex<Option<SelectionFilter>>,
}

#[async_trait]
impl SymbolSource for CapturingSource {
    async fn select(&self, filter: &SelectionFilter) -> Result<Vec<SymbolCandidate>> {
        *self.filter.lock().unwrap() = Some(filter.clone());
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct FakeJob {
    exits_after_polls: usize,
    polls: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

#[async_trait]
impl JobController for FakeJob {
    async fn start(&self, _config_id: &str, _job_config: &str) -> bool {
        self.started.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn stop(&self) -> bool {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn has_exited(&self) -> bool {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        self.exits_after_polls != 0 && polls >= self.exits_after_polls
    }
}

struct FakeHarvester {
    records: Vec<BacktestRecord>,
    purged: AtomicBool,
}

#[async_trait]
impl ResultHarvester for FakeHarvester {
    async fn purge(&self) -> Result<()> {
        self.purged.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn harvest(&self) -> Result<Vec<BacktestRecord>> {
        Ok(self.records.clone())
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<(String, Vec<SymbolPerformance>)>>,
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save(&self, strategy: &str, data: Vec<SymbolPerformance>) -> Result<()> {
        self.saved.lock().unwrap().push((strategy.to_string(), data));
        Ok(())
    }

    async fn load(&self, strategy: &str) -> Result<Option<Vec<SymbolPerformance>>> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == strategy)
            .map(|(_, data)| data.clone()))
    }
}

fn strategies(max_execution_hours: u64) -> StrategiesFile {
    let raw = format!(
        r#"
        max_execution_hours = {max_execution_hours}

        [[strategy]]
        name = "grid"
        job_config = "backtest/grid.hjson"
        "#
    );
    toml::from_str(&raw).unwrap()
}

fn service(
    candidates: Vec<SymbolCandidate>,
    job: Arc<FakeJob>,
    records: Vec<BacktestRecord>,
    store: Arc<MemoryStore>,
    max_execution_hours: u64,
) -> BacktestService {
    BacktestService::new(
        Arc::new(FakeSource { candidates }),
        job,
        Arc::new(FakeHarvester {
            records,
            purged: AtomicBool::new(false),
        }),
        store,
        strategies(max_execution_hours),
    )
}

#[tokio::test(start_paused = true)]
async fn successful_cycle_joins_and_persists_results() {
    let job = Arc::new(FakeJob {
        exits_after_polls: 3,
        ..Default::default()
    });
    let store = Arc::new(MemoryStore::default());
    let service = service(
        vec![candidate("BTCUSDT"), candidate("ETHUSDT")],
        job.clone(),
        vec![record("ETHUSDT", 0.002), record("BTCUSDT", 0.001)],
        store.clone(),
        3,
    );

    let strategies = strategies(3);
    service.run_strategy(&strategies.strategies[0]).await.unwrap();

    assert_eq!(job.started.load(Ordering::SeqCst), 1);
    let saved = store.load("grid").await.unwrap().unwrap();
    assert_eq!(saved.len(), 2);
    // Result records are joined back by symbol, not by position.
    assert_eq!(saved[0].symbol, "BTCUSDT");
    assert_eq!(saved[0].result.result.adg_long, Some(0.001));
    assert_eq!(saved[1].symbol, "ETHUSDT");
    assert_eq!(saved[1].result.result.adg_long, Some(0.002));
}

#[tokio::test(start_paused = true)]
async fn result_count_mismatch_is_an_error() {
    let job = Arc::new(FakeJob {
        exits_after_polls: 1,
        ..Default::default()
    });
    let store = Arc::new(MemoryStore::default());
    let service = service(
        vec![candidate("BTCUSDT"), candidate("ETHUSDT")],
        job,
        vec![record("BTCUSDT", 0.001)],
        store.clone(),
        3,
    );

    let strategies = strategies(3);
    let err = service
        .run_strategy(&strategies.strategies[0])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expected 2 results"));
    assert!(store.load("grid").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn runaway_job_is_stopped_after_the_runtime_ceiling() {
    // Job never exits.
    let job = Arc::new(FakeJob::default());
    let store = Arc::new(MemoryStore::default());
    let service = service(
        vec![candidate("BTCUSDT")],
        job.clone(),
        vec![record("BTCUSDT", 0.001)],
        store.clone(),
        1,
    );

    let strategies = strategies(1);
    let err = service
        .run_strategy(&strategies.strategies[0])
        .await
        .unwrap_err();

    assert!(matches!(err, common::Error::Timeout(_)), "{err}");
    assert!(job.stopped.load(Ordering::SeqCst) >= 1);
    assert!(store.load("grid").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn failing_strategy_does_not_block_the_rest_of_the_pass() {
    let job = Arc::new(FakeJob {
        exits_after_polls: 1,
        ..Default::default()
    });
    let store = Arc::new(MemoryStore::default());
    let raw = r#"
        [[strategy]]
        name = "alpha"
        job_config = "backtest/alpha.hjson"

        [[strategy]]
        name = "beta"
        job_config = "backtest/beta.hjson"
        "#;
    let service = BacktestService::new(
        Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
            candidates: vec![candidate("BTCUSDT")],
        }),
        job.clone(),
        Arc::new(FakeHarvester {
            records: vec![record("BTCUSDT", 0.001)],
            purged: AtomicBool::new(false),
        }),
        store.clone(),
        toml::from_str(raw).unwrap(),
    );

    // The pass still reports the failure, but the surviving strategy ran
    // to completion and persisted its results.
    let err = service.run_pass().await.unwrap_err();
    assert!(err.to_string().contains("1 of 2"), "{err}");
    assert!(store.load("alpha").await.unwrap().is_none());
    let saved = store.load("beta").await.unwrap().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(job.started.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn selection_windows_are_aligned_to_utc_midnight() {
    let source = Arc::new(CapturingSource::default());
    let store = Arc::new(MemoryStore::default());
    let service = BacktestService::new(
        source.clone(),
        Arc::new(FakeJob::default()),
        Arc::new(FakeHarvester {
            records: Vec::new(),
            purged: AtomicBool::new(false),
        }),
        store,
        strategies(3),
    );

    let strategies = strategies(3);
    // Empty selection fails the cycle; the filter was captured first.
    let _ = service.run_strategy(&strategies.strategies[0]).await;

    let filter = source.filter.lock().unwrap().clone().unwrap();
    assert_eq!(filter.window_end.time(), chrono::NaiveTime::MIN);
    assert_eq!(filter.window_start.time(), chrono::NaiveTime::MIN);
    assert_eq!(filter.min_launch_time.time(), chrono::NaiveTime::MIN);
    assert_eq!((filter.window_end - filter.window_start).num_days(), 30);
    assert_eq!((filter.window_end - filter.min_launch_time).num_days(), 90);
}

#[tokio::test(start_paused = true)]
async fn empty_selection_is_an_error() {
    let job = Arc::new(FakeJob::default());
    let store = Arc::new(MemoryStore::default());
    let service = service(Vec::new(), job.clone(), Vec::new(), store, 3);

    let strategies = strategies(3);
    let err = service
        .run_strategy(&strategies.strategies[0])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no symbols selected"));
    assert_eq!(job.started.load(Ordering::SeqCst), 0);
}
