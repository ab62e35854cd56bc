use serde::Deserialize;

use common::{Error, Result};

/// Top-level strategies config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// interval_hours = 2
/// max_execution_hours = 3
/// blacklist = ["LUNA"]
///
/// [[strategy]]
/// name = "recursive grid"
/// job_config = "backtest/recursive_grid.hjson"
/// backtest_days = 30
/// launch_days = 90
/// top_volume_percentile = 0.15
/// market_cap_filter = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StrategiesFile {
    /// Hours between successful orchestration passes.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// Hard per-strategy runtime ceiling.
    #[serde(default = "default_max_execution_hours")]
    pub max_execution_hours: u64,
    #[serde(default = "default_true")]
    pub trend_enabled: bool,
    #[serde(default = "default_trend_interval_hours")]
    pub trend_interval_hours: u64,
    /// Coins never selected, in exchange-symbol or coin form.
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Human-readable name; the persistence key for this strategy's runs.
    pub name: String,
    /// Config id passed to the job, relative to the configs mount.
    pub job_config: String,
    #[serde(default = "default_backtest_days")]
    pub backtest_days: i64,
    /// Minimum age of a symbol's listing to be eligible.
    #[serde(default = "default_launch_days")]
    pub launch_days: i64,
    #[serde(default = "default_top_volume_percentile")]
    pub top_volume_percentile: f64,
    #[serde(default)]
    pub market_cap_filter: bool,
    #[serde(default = "default_min_market_cap_ratio")]
    pub min_market_cap_ratio: f64,
}

impl StrategiesFile {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read strategies config at '{path}': {e}"));
        toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse strategies config at '{path}': {e}"))
    }

    /// Startup-only validation; a bad file is a deployment error, not a
    /// runtime condition.
    pub fn validate(&self) -> Result<()> {
        if self.interval_hours == 0 || self.max_execution_hours == 0 || self.trend_interval_hours == 0
        {
            return Err(Error::Config("intervals must be positive".into()));
        }
        if self.strategies.is_empty() {
            return Err(Error::Config("no strategies configured".into()));
        }
        for strategy in &self.strategies {
            if strategy.name.trim().is_empty() {
                return Err(Error::Config("strategy name must not be empty".into()));
            }
            if strategy.job_config.trim().is_empty() {
                return Err(Error::Config(format!(
                    "strategy '{}': job_config must not be empty",
                    strategy.name
                )));
            }
            if strategy.backtest_days <= 0 || strategy.launch_days <= 0 {
                return Err(Error::Config(format!(
                    "strategy '{}': durations must be positive",
                    strategy.name
                )));
            }
            if strategy.backtest_days > strategy.launch_days {
                return Err(Error::Config(format!(
                    "strategy '{}': backtest_days exceeds launch_days",
                    strategy.name
                )));
            }
            if !(0.0..=1.0).contains(&strategy.top_volume_percentile) {
                return Err(Error::Config(format!(
                    "strategy '{}': top_volume_percentile must be in [0, 1]",
                    strategy.name
                )));
            }
        }
        Ok(())
    }
}

fn default_interval_hours() -> u64 {
    2
}

fn default_max_execution_hours() -> u64 {
    3
}

fn default_trend_interval_hours() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_backtest_days() -> i64 {
    30
}

fn default_launch_days() -> i64 {
    90
}

fn default_top_volume_percentile() -> f64 {
    0.15
}

fn default_min_market_cap_ratio() -> f64 {
    0.0003
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> StrategiesFile {
        toml::from_str(
            r#"
            [[strategy]]
            name = "grid"
            job_config = "backtest/grid.hjson"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let file = minimal();
        assert_eq!(file.interval_hours, 2);
        assert_eq!(file.max_execution_hours, 3);
        assert!(file.trend_enabled);
        assert_eq!(file.trend_interval_hours, 1);
        let s = &file.strategies[0];
        assert_eq!(s.backtest_days, 30);
        assert_eq!(s.launch_days, 90);
        assert_eq!(s.top_volume_percentile, 0.15);
        assert!(!s.market_cap_filter);
        assert_eq!(s.min_market_cap_ratio, 0.0003);
        assert!(file.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut file = minimal();
        file.strategies[0].backtest_days = 120;
        assert!(file.validate().is_err(), "backtest longer than launch age");

        let mut file = minimal();
        file.strategies[0].top_volume_percentile = 1.5;
        assert!(file.validate().is_err(), "percentile out of range");

        let mut file = minimal();
        file.strategies[0].job_config = "  ".into();
        assert!(file.validate().is_err(), "blank job config");

        let mut file = minimal();
        file.interval_hours = 0;
        assert!(file.validate().is_err(), "zero interval");

        let mut file = minimal();
        file.strategies.clear();
        assert!(file.validate().is_err(), "no strategies");
    }
}
