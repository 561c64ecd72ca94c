//! Ops Server - Liveness, Readiness, and Metrics
//!
//! Exposes /live, /ready, and /metrics via axum 0.7 for container
//! health checks and scraping. Readiness depends on the broadcast loop
//! running and having finished a tick recently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use super::prometheus::MetricsRegistry;

/// Shared health state updated by the broadcast loop.
#[derive(Debug)]
pub struct HealthState {
    /// Whether the broadcast loop is running.
    loop_running: AtomicBool,
    /// Unix ms of the last finished tick (0 = never).
    last_tick_ms: AtomicI64,
    /// A tick older than this makes the relay not ready.
    staleness: Duration,
}

impl HealthState {
    /// Create a new health state; nothing is ready until the first tick.
    pub fn new(staleness: Duration) -> Self {
        Self {
            loop_running: AtomicBool::new(false),
            last_tick_ms: AtomicI64::new(0),
            staleness,
        }
    }

    pub fn set_loop_running(&self, running: bool) {
        self.loop_running.store(running, Ordering::Relaxed);
    }

    /// Record that a tick just finished, whatever its outcome.
    pub fn record_tick(&self) {
        self.last_tick_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Milliseconds since the last finished tick.
    pub fn since_last_tick_ms(&self) -> Option<i64> {
        match self.last_tick_ms.load(Ordering::Relaxed) {
            0 => None,
            last => Some(Utc::now().timestamp_millis() - last),
        }
    }

    /// Check if the relay is serving fresh data.
    pub fn is_ready(&self) -> bool {
        let fresh = self
            .since_last_tick_ms()
            .and_then(|age| u64::try_from(age).ok())
            .is_some_and(|age| u128::from(age) <= self.staleness.as_millis());
        self.loop_running.load(Ordering::Relaxed) && fresh
    }
}

#[derive(Clone)]
struct OpsState {
    health: Arc<HealthState>,
    metrics: Arc<MetricsRegistry>,
}

/// Axum-based ops HTTP server.
pub struct HealthServer {
    health: Arc<HealthState>,
    metrics: Arc<MetricsRegistry>,
    bind_address: String,
}

impl HealthServer {
    pub fn new(
        health: Arc<HealthState>,
        metrics: Arc<MetricsRegistry>,
        bind_address: String,
    ) -> Self {
        Self {
            health,
            metrics,
            bind_address,
        }
    }

    /// Routes, exposed separately for tests.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/metrics", get(Self::metrics))
            .with_state(OpsState {
                health: Arc::clone(&self.health),
                metrics: Arc::clone(&self.metrics),
            })
    }

    /// Serve until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Ops server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only while ticks are fresh.
    async fn readiness(State(state): State<OpsState>) -> impl IntoResponse {
        if state.health.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn metrics(State(state): State<OpsState>) -> impl IntoResponse {
        match state.metrics.render() {
            Ok(text) => (StatusCode::OK, text),
            Err(e) => {
                error!(error = %e, "Failed to render metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_before_first_tick() {
        let health = HealthState::new(Duration::from_secs(60));
        health.set_loop_running(true);
        assert!(!health.is_ready());
        assert!(health.since_last_tick_ms().is_none());
    }

    #[test]
    fn test_ready_after_tick_while_running() {
        let health = HealthState::new(Duration::from_secs(60));
        health.set_loop_running(true);
        health.record_tick();
        assert!(health.is_ready());

        health.set_loop_running(false);
        assert!(!health.is_ready());
    }
}
