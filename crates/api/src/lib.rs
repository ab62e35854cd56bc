mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::backtest::ResultStore;
use trend::TrendStore;

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub trend_store: Arc<TrendStore>,
    pub result_store: Arc<dyn ResultStore>,
    pub api_token: String,
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the Axum API server.
pub async fn serve(state: AppState, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = app(state);

    info!(%addr, "Read API listening");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
