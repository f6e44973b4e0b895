//! # joinx-server: HTTP Service for Join-Order Search
//!
//! Exposes the level-by-level join search as a network service. A client posts a
//! join problem (relations with row counts, join clauses, outer/semi/anti join
//! constraints, partitions and an optional leading directive) and gets back the
//! cheapest join tree found.
//!
//! ## Endpoints
//!
//! - `GET  /health`       - Health check
//! - `POST /join-search`  - Search a join order (JSON, see [`problem`])
//!
//! ## Configuration
//!
//! Listens on `JOINX_BIND` (default `0.0.0.0:3000`). Logging is controlled by
//! `RUST_LOG` (defaults to `joinx=debug`).

mod problem;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("joinx=debug".parse().unwrap()))
        .init();

    let config = state::ServerConfig::from_env();
    let bind = config.bind.clone();
    let state = Arc::new(state::AppState::new(config));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/join-search", post(routes::join_search))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind).await.unwrap();
    tracing::info!("joinx-server listening on http://{}", bind);
    axum::serve(listener, app).await.unwrap();
}
