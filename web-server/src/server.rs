//! HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state.

use std::sync::Arc;
use std::time::Instant;

use analysis_pipeline::AnalysisCoordinator;
use axum::{
    routing::{get, post},
    Router,
};
use cache_store::CacheStore;
use snooze_core::{CoreError, ServerConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::hub::EventHub;
use crate::sse;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<AnalysisCoordinator>,
    /// Events of every async run, replayed and fanned out to `/api/events`.
    pub hub: Arc<EventHub>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<AnalysisCoordinator>, event_buffer: usize) -> Self {
        Self {
            coordinator,
            hub: Arc::new(EventHub::new(event_buffer)),
            start_time: Instant::now(),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        self.coordinator.cache()
    }
}

/// Routes:
/// - POST /api/analyze
/// - POST /api/analyze-async
/// - GET /api/events
/// - GET /api/cache/stats
/// - POST /api/cache/clear
/// - GET /api/health
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/analyze-async", post(handlers::analyze_async))
        .route("/api/events", get(sse::events))
        .route("/api/cache/stats", get(handlers::cache_stats))
        .route("/api/cache/clear", post(handlers::cache_clear))
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind to `host:port` and serve until Ctrl-C.
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<(), CoreError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("failed to bind server to {addr}: {e}"),
        })?;

    tracing::info!("Snooze server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("server error: {e}"),
        })?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            event_buffer: 16,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
    }
}
