//! HTTP server and routing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::ws::{upgrade_gate, ws_handler, ConnectionRegistry, RelayMetrics, RelayMetricsSnapshot, UpgradeGate};

/// State shared by every request and connection task.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Upgrade gate.
    pub gate: UpgradeGate,
    /// Open connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Metrics.
    pub metrics: Arc<RelayMetrics>,
}

impl AppState {
    /// Creates fresh state with an empty registry.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            gate: UpgradeGate::new(&config.relay_path),
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            metrics: Arc::new(RelayMetrics::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// Response body of `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Connections currently registered.
    pub registered: usize,
    /// Counters.
    pub metrics: RelayMetricsSnapshot,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    let relay_path = state.config.relay_path.clone();

    Router::new()
        .route("/", get(landing))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route(&relay_path, get(ws_handler))
        .fallback(landing)
        .layer(middleware::from_fn_with_state(state.clone(), upgrade_gate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn landing(State(state): State<AppState>) -> String {
    format!(
        "Funnel relay is running.\nHealth: /health\nWebSocket: ws(s)://<host>{}\n",
        state.config.relay_path
    )
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        registered: state.registry.len().await,
        metrics: state.metrics.snapshot(),
    })
}

/// The relay server.
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

impl Server {
    /// Creates a server with a fresh registry.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    /// Returns the shared state.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or binding fails.
    pub async fn run(self) -> Result<(), RelayError> {
        self.state.config.validate()?;
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        self.serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
    }

    /// Serves on an existing listener until `shutdown` resolves, then
    /// closes every remaining connection.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!("relay listening on {}", addr);

        let registry = Arc::clone(&self.state.registry);
        let app = router(self.state);

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        registry.close_all().await;
        info!("relay stopped");
        result.map_err(RelayError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_new() {
        let state = AppState::new(ServerConfig::default().with_relay_path("/relay"));
        assert_eq!(state.gate.relay_path(), "/relay");
        assert_eq!(state.metrics.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_app_state_starts_empty() {
        let state = AppState::default();
        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_landing_mentions_relay_path() {
        let state = AppState::default();
        let body = landing(State(state)).await;
        assert!(body.contains("/health"));
        assert!(body.contains("/ws"));
    }
}
