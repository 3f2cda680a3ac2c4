mod handlers;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/location", get(handlers::location))
        .route("/api/location/retry", post(handlers::retry))
        .route("/api/restaurants", get(handlers::restaurants))
        .route("/api/restaurants/{id}", get(handlers::restaurant))
        .route("/api/filters", get(handlers::filters))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until the process is stopped. Location resolution starts
/// immediately; the search feed in `state` follows each resolved location.
pub async fn start(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    state.resolver.resolve();

    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("Cannot bind to {}: {}", addr, e);
        e
    })?;

    info!("CalorieQuest API listening on http://{}", addr);
    axum::serve(listener, app).await
}
