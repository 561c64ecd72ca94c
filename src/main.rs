//! LTP Relay — Entry Point
//!
//! Initializes configuration, logging, the store and upstream clients,
//! and the price broadcast loop. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config (argv[1], `LTP_RELAY_CONFIG`, or `config.toml`) + validate
//! 2. Init tracing (JSON or plain structured logging)
//! 3. Create metrics registry, health state, subscriber set
//! 4. Create the catalog store (Firebase REST or local file)
//! 5. Create UpstoxClient (HTTP + retry)
//! 6. Spawn ops server (/live, /ready, /metrics)
//! 7. Spawn subscriber gateway (WebSocket)
//! 8. Spawn the price broadcast loop
//! 9. Wait for SIGINT → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ltp_relay::adapters::gateway::SubscriberGateway;
use ltp_relay::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use ltp_relay::adapters::store::{FileStore, FirebaseStore};
use ltp_relay::adapters::upstream::{UpstoxClient, UpstoxClientConfig};
use ltp_relay::config::loader::load_config;
use ltp_relay::config::{AppConfig, StoreKind};
use ltp_relay::ports::CatalogStore;
use ltp_relay::usecases::{PriceBroadcaster, SubscriberSet, SymbolResolver};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("LTP_RELAY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    // ── 2. Initialize structured logging ────────────────────
    init_tracing(&config);

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        store = ?config.store.kind,
        categories = ?config.store.categories,
        "Starting LTP relay"
    );

    // ── 3. Shared state ─────────────────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let health = Arc::new(HealthState::new(readiness_window(&config)));
    let subscribers = Arc::new(SubscriberSet::with_gauge(metrics.subscribers.clone()));

    // ── 4. Catalog store ────────────────────────────────────
    let store = build_store(&config).context("Failed to create catalog store")?;

    // ── 5. Upstream quote client ────────────────────────────
    let quotes = Arc::new(
        UpstoxClient::new(UpstoxClientConfig::from(&config.upstream))
            .context("Failed to create upstream client")?,
    );

    let resolver = SymbolResolver::new(store, config.store.categories.clone());
    let broadcaster = Arc::new(PriceBroadcaster::new(
        resolver,
        quotes,
        Arc::clone(&subscribers),
        Arc::clone(&metrics),
        Arc::clone(&health),
        config.broadcast.clone(),
    ));

    // ── 6. Ops server ───────────────────────────────────────
    let ops = HealthServer::new(
        Arc::clone(&health),
        Arc::clone(&metrics),
        config.ops.bind_address.clone(),
    );
    let ops_shutdown = shutdown_tx.subscribe();
    let ops_handle = tokio::spawn(async move {
        if let Err(e) = ops.run(ops_shutdown).await {
            error!(error = %e, "Ops server failed");
        }
    });

    // ── 7. Subscriber gateway ───────────────────────────────
    let gateway = SubscriberGateway::new(Arc::clone(&subscribers), config.gateway.clone());
    let gateway_shutdown = shutdown_tx.subscribe();
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway.run(gateway_shutdown).await {
            error!(error = %e, "Subscriber gateway failed");
        }
    });

    // ── 8. Broadcast loop ───────────────────────────────────
    let loop_shutdown = shutdown_tx.subscribe();
    let loop_ref = Arc::clone(&broadcaster);
    let loop_handle = tokio::spawn(async move {
        loop_ref.run(loop_shutdown).await;
    });

    info!("All tasks spawned — relay is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    } else {
        info!("SIGINT received, initiating graceful shutdown");
    }

    let _ = shutdown_tx.send(());
    info!("Shutdown signal broadcast to all tasks");

    // An in-flight tick finishes first, bounded by the upstream timeout.
    let loop_grace =
        Duration::from_millis(config.upstream.timeout_ms.saturating_mul(2)) + Duration::from_secs(1);
    if tokio::time::timeout(loop_grace, loop_handle).await.is_err() {
        warn!("Broadcast loop did not stop in time");
    }

    let _ = tokio::time::timeout(Duration::from_secs(5), gateway_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), ops_handle).await;

    info!(
        subscribers = subscribers.len(),
        "Shutdown complete"
    );
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));

    if config.service.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// A relay whose last tick is older than this reports not ready.
fn readiness_window(config: &AppConfig) -> Duration {
    (config.broadcast.credential_backoff() + Duration::from_millis(config.upstream.timeout_ms)) * 3
}

fn build_store(config: &AppConfig) -> Result<Arc<dyn CatalogStore>> {
    let store = &config.store;

    match store.kind {
        StoreKind::Firebase => {
            let timeout = Duration::from_millis(config.upstream.timeout_ms);
            let firebase = FirebaseStore::from_config(store, timeout)?;
            info!(catalog = %store.catalog_path, "Using Firebase catalog store");
            Ok(Arc::new(firebase))
        }
        StoreKind::File => {
            let path = store
                .file_path
                .as_deref()
                .context("store.file_path is required for the file store")?;
            info!(path = %path, catalog = %store.catalog_path, "Using file catalog store");
            Ok(Arc::new(FileStore::new(
                path,
                &store.catalog_path,
                &store.token_path,
            )))
        }
    }
}
