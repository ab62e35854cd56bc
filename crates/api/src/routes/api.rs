use axum::{
    extract::{Query, State},
    middleware,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use common::SymbolPerformance;

use crate::{auth::require_auth, AppState};

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/market-trend", get(get_market_trend))
        .route("/api/strategy-results", get(get_strategy_results))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

// ─── Market trend ─────────────────────────────────────────────────────────────

async fn get_market_trend(State(state): State<AppState>) -> Json<Value> {
    match state.trend_store.get().await {
        Some(verdict) => Json(json!({
            "market_trend": verdict.global_trend,
            "data_available": true,
        })),
        None => Json(json!({
            "market_trend": common::Trend::Unknown,
            "data_available": false,
        })),
    }
}

// ─── Strategy results ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    pub strategy: String,
    pub max_symbols: Option<usize>,
    /// Keep symbols whose max leverage is at least this.
    pub min_leverage: Option<f64>,
    /// Keep symbols whose minimum order value fits this budget.
    pub initial_order_size: Option<f64>,
    pub copy_trade_only: Option<bool>,
    /// Comma-separated, case-insensitive exclusion list.
    pub ignored_symbols: Option<String>,
}

async fn get_strategy_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Json<Value> {
    let data = match state.result_store.load(&query.strategy).await {
        Ok(data) => data,
        Err(e) => {
            warn!(strategy = %query.strategy, error = %e, "Failed to load strategy results");
            None
        }
    };
    let Some(data) = data.filter(|d| !d.is_empty()) else {
        return Json(json!({
            "strategy": query.strategy,
            "symbols": [],
            "total_long_adg": 0.0,
            "data_available": false,
        }));
    };

    let (symbols, total_long_adg) = filter_and_rank(data, &query);
    Json(json!({
        "strategy": query.strategy,
        "symbols": symbols,
        "total_long_adg": total_long_adg,
        "data_available": true,
    }))
}

/// Apply the client's filters, order by long ADG descending, cap the list
/// and sum the surviving ADGs.
fn filter_and_rank(
    data: Vec<SymbolPerformance>,
    query: &ResultsQuery,
) -> (Vec<SymbolPerformance>, f64) {
    let ignored: Vec<String> = query
        .ignored_symbols
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    let mut kept: Vec<SymbolPerformance> = data
        .into_iter()
        .filter(|p| !query.copy_trade_only.unwrap_or(false) || p.copy_trade_enabled)
        .filter(|p| query.min_leverage.map_or(true, |min| p.max_leverage >= min))
        .filter(|p| !ignored.contains(&p.symbol.to_uppercase()))
        .filter(|p| {
            query
                .initial_order_size
                .map_or(true, |budget| p.min_quantity * p.last_price <= budget)
        })
        .filter(|p| adg_long(p) > 0.0)
        .collect();

    kept.sort_by(|a, b| {
        adg_long(b)
            .partial_cmp(&adg_long(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let Some(max) = query.max_symbols {
        kept.truncate(max);
    }

    let total: f64 = kept.iter().map(adg_long).sum();
    (kept, total)
}

fn adg_long(p: &SymbolPerformance) -> f64 {
    p.result.result.adg_long.unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BacktestRecord, BacktestStats};

    fn perf(symbol: &str, adg: f64, leverage: f64, copy_trade: bool) -> SymbolPerformance {
        SymbolPerformance {
            symbol: symbol.to_string(),
            volatility: 1.0,
            median_volume: 2.0,
            max_leverage: leverage,
            min_quantity: 0.1,
            min_notional_value: 5.0,
            last_price: 100.0,
            copy_trade_enabled: copy_trade,
            result: BacktestRecord {
                result: BacktestStats {
                    symbol: Some(symbol.to_string()),
                    adg_long: Some(adg),
                    ..Default::default()
                },
            },
        }
    }

    fn data() -> Vec<SymbolPerformance> {
        vec![
            perf("BTCUSDT", 0.001, 100.0, true),
            perf("ETHUSDT", 0.003, 50.0, false),
            perf("SOLUSDT", 0.002, 25.0, true),
            perf("DOGEUSDT", -0.001, 25.0, true),
        ]
    }

    #[test]
    fn ranks_by_adg_and_sums_the_total() {
        let (kept, total) = filter_and_rank(data(), &ResultsQuery::default());
        let symbols: Vec<&str> = kept.iter().map(|p| p.symbol.as_str()).collect();
        // Negative ADG never survives.
        assert_eq!(symbols, vec!["ETHUSDT", "SOLUSDT", "BTCUSDT"]);
        assert!((total - 0.006).abs() < 1e-12);
    }

    #[test]
    fn max_symbols_caps_after_ranking() {
        let query = ResultsQuery {
            max_symbols: Some(1),
            ..Default::default()
        };
        let (kept, total) = filter_and_rank(data(), &query);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].symbol, "ETHUSDT");
        assert!((total - 0.003).abs() < 1e-12);
    }

    #[test]
    fn copy_trade_and_leverage_filters_apply() {
        let query = ResultsQuery {
            copy_trade_only: Some(true),
            min_leverage: Some(50.0),
            ..Default::default()
        };
        let (kept, _) = filter_and_rank(data(), &query);
        let symbols: Vec<&str> = kept.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT"]);
    }

    #[test]
    fn ignored_symbols_match_case_insensitively() {
        let query = ResultsQuery {
            ignored_symbols: Some("ethusdt, SolUsdt".into()),
            ..Default::default()
        };
        let (kept, _) = filter_and_rank(data(), &query);
        let symbols: Vec<&str> = kept.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT"]);
    }

    #[test]
    fn order_size_budget_uses_min_notional_quantity() {
        // min_quantity 0.1 × last_price 100 = 10 per symbol.
        let query = ResultsQuery {
            initial_order_size: Some(5.0),
            ..Default::default()
        };
        let (kept, total) = filter_and_rank(data(), &query);
        assert!(kept.is_empty());
        assert_eq!(total, 0.0);
    }
}
