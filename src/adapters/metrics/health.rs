//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7. Readiness follows the
//! orchestrator: ready while an ingestion strategy is running.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::usecases::orchestrator::StreamSnapshot;

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Engine state published by the orchestrator.
    stream: watch::Receiver<StreamSnapshot>,
}

impl HealthState {
    pub fn new(stream: watch::Receiver<StreamSnapshot>) -> Self {
        Self { stream }
    }

    /// Check if the engine is streaming.
    pub fn is_ready(&self) -> bool {
        self.stream.borrow().running
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with the handlers.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until `shutdown` is cancelled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only while a strategy is running.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Pair;

    #[test]
    fn test_ready_follows_stream_state() {
        let (tx, rx) = watch::channel(StreamSnapshot {
            exchange: "binance".to_string(),
            pair: Pair::default(),
            strategy: None,
            running: false,
        });
        let health = HealthState::new(rx);
        assert!(!health.is_ready());

        tx.send_modify(|s| s.running = true);
        assert!(health.is_ready());
    }
}
