//! Application state and HTTP router construction.
//!
//! Used by [main] and by the integration tests to build the Axum app.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::Config;
use crate::services::TransferLauncher;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub launcher: Arc<dyn TransferLauncher>,
}

/// Build the full Axum router with state applied, ready for `axum::serve`
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .merge(api::health::router())
        .nest("/api", api::webhook::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
