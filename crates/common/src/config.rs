/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
///
/// Strategy definitions live in a separate TOML file (`strategies_path`),
/// loaded and validated by the backtest crate.
#[derive(Debug, Clone)]
pub struct Config {
    // Market-data provider (CoinMarketCap). An empty key disables fetching
    // entirely; the cache then only ever serves stale data.
    pub cmc_api_key: String,
    pub cmc_cache_hours: u64,
    pub cmc_coin_limit: usize,

    // Job substrate (Docker Engine API over TCP)
    pub docker_host: String,
    pub backtest_image: String,

    // Host paths bind-mounted into the backtest container
    pub mount_configs_path: String,
    pub mount_api_keys_path: String,
    pub mount_backtests_path: String,
    pub mount_historical_data_path: String,

    /// Host path the generated job config is written to before each run.
    pub job_config_host_path: String,

    /// Root of the output tree the harvester reads.
    pub results_path: String,

    /// JSON file backing the strategy result store.
    pub results_file: String,

    // Read API
    pub api_token: String,
    pub api_port: u16,

    // Strategy config file path
    pub strategies_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Config {
            cmc_api_key: optional_env("CMC_API_KEY").unwrap_or_default(),
            cmc_cache_hours: optional_env("CMC_CACHE_HOURS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            cmc_coin_limit: optional_env("CMC_COIN_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            docker_host: optional_env("DOCKER_HOST")
                .unwrap_or_else(|| "http://localhost:2375".to_string()),
            backtest_image: required_env("BACKTEST_IMAGE"),
            mount_configs_path: optional_env("MOUNT_CONFIGS_PATH")
                .unwrap_or_else(|| "data/passivbot/configs".to_string()),
            mount_api_keys_path: optional_env("MOUNT_API_KEYS_PATH")
                .unwrap_or_else(|| "data/passivbot/api-keys.json".to_string()),
            mount_backtests_path: optional_env("MOUNT_BACKTESTS_PATH")
                .unwrap_or_else(|| "data/passivbot/backtests".to_string()),
            mount_historical_data_path: optional_env("MOUNT_HISTORICAL_DATA_PATH")
                .unwrap_or_else(|| "data/passivbot/historical_data".to_string()),
            job_config_host_path: optional_env("JOB_CONFIG_PATH")
                .unwrap_or_else(|| "data/passivbot/configs/backtest/default.hjson".to_string()),
            results_path: optional_env("RESULTS_PATH")
                .unwrap_or_else(|| "data/passivbot/backtests/bybit".to_string()),
            results_file: optional_env("RESULTS_FILE")
                .unwrap_or_else(|| "data/strategy_results.json".to_string()),
            api_token: required_env("API_TOKEN"),
            api_port: optional_env("API_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            strategies_path: optional_env("STRATEGIES_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
