use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use backtest::{BacktestService, FileResultStore, PlotsHarvester, StrategiesFile};
use common::Config;
use exchange::BybitClient;
use lifecycle::{DockerRuntime, LifecycleController, MountPaths};
use marketcap::{CmcClient, MarketDataCache};
use selector::SymbolSelector;
use trend::{TrendAggregator, TrendStore};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!("backtestd starting");

    let strategies = StrategiesFile::load(&cfg.strategies_path);
    strategies
        .validate()
        .unwrap_or_else(|e| panic!("Invalid strategies config at '{}': {e}", cfg.strategies_path));

    // ── Data sources ──────────────────────────────────────────────────────────
    let exchange: Arc<dyn common::ExchangeData> = Arc::new(BybitClient::new());
    let market_cap = Arc::new(MarketDataCache::new(
        Box::new(CmcClient::new(&cfg.cmc_api_key)),
        !cfg.cmc_api_key.is_empty(),
        Duration::from_secs(cfg.cmc_cache_hours * 3600),
        cfg.cmc_coin_limit,
    ));

    // ── Orchestration collaborators ───────────────────────────────────────────
    let selector = Arc::new(SymbolSelector::new(
        exchange.clone(),
        market_cap.clone(),
        strategies.blacklist.clone(),
    ));
    let controller = Arc::new(LifecycleController::new(
        Box::new(DockerRuntime::new(&cfg.docker_host)),
        &cfg.backtest_image,
        MountPaths {
            configs: cfg.mount_configs_path.clone(),
            api_keys: cfg.mount_api_keys_path.clone(),
            backtests: cfg.mount_backtests_path.clone(),
            historical_data: cfg.mount_historical_data_path.clone(),
        },
        &cfg.job_config_host_path,
    ));
    let harvester = Arc::new(PlotsHarvester::new(&cfg.results_path));
    let store = Arc::new(FileResultStore::new(&cfg.results_file));

    // ── Trend aggregation ─────────────────────────────────────────────────────
    let trend_store = Arc::new(TrendStore::default());
    if strategies.trend_enabled {
        let aggregator = TrendAggregator::new(exchange.clone(), market_cap.clone());
        let interval = Duration::from_secs(strategies.trend_interval_hours * 3600);
        tokio::spawn(aggregator.run(trend_store.clone(), interval));
    } else {
        info!("Trend aggregation disabled by config");
    }

    // ── Backtest orchestration ────────────────────────────────────────────────
    let service = BacktestService::new(
        selector,
        controller,
        harvester,
        store.clone(),
        strategies,
    );
    tokio::spawn(service.run());

    // ── Read API ──────────────────────────────────────────────────────────────
    let api_state = api::AppState {
        trend_store,
        result_store: store,
        api_token: cfg.api_token.clone(),
    };
    tokio::spawn(api::serve(api_state, cfg.api_port));

    // Keep main alive
    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.unwrap();
    info!("Shutdown signal received. Exiting.");
}
