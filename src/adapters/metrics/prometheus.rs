//! Prometheus Metrics Registry - Relay Observability
//!
//! Registers the relay's metrics and renders them in the text exposition
//! format for the `/metrics` endpoint. Covers tick outcomes, upstream
//! latency and failures, subscriber churn, and snapshot coverage.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Centralized Prometheus metrics for the relay.
///
/// All metrics follow the naming convention `ltp_relay_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Completed ticks by outcome (delivered, credential_unavailable, catalog_unavailable).
    pub ticks: IntCounterVec,
    /// Batched upstream request latency.
    pub upstream_latency: Histogram,
    /// Upstream requests that failed after retries.
    pub upstream_failures: IntCounter,
    /// Current subscriber count.
    pub subscribers: IntGauge,
    /// Failed deliveries by reason.
    pub deliveries_failed: IntCounterVec,
    /// Symbols in the last snapshot by state (priced, unavailable).
    pub snapshot_symbols: IntGaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ticks = IntCounterVec::new(
            Opts::new("ltp_relay_ticks_total", "Broadcast ticks by outcome"),
            &["outcome"],
        )?;

        let upstream_latency = Histogram::with_opts(
            HistogramOpts::new(
                "ltp_relay_upstream_latency_seconds",
                "Batched LTP request latency in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        let upstream_failures = IntCounter::new(
            "ltp_relay_upstream_failures_total",
            "Batched LTP requests that failed",
        )?;

        let subscribers = IntGauge::new("ltp_relay_subscribers", "Connected subscribers")?;

        let deliveries_failed = IntCounterVec::new(
            Opts::new(
                "ltp_relay_deliveries_failed_total",
                "Snapshot deliveries that failed, by reason",
            ),
            &["reason"],
        )?;

        let snapshot_symbols = IntGaugeVec::new(
            Opts::new(
                "ltp_relay_snapshot_symbols",
                "Symbols in the last snapshot, by state",
            ),
            &["state"],
        )?;

        // Register all metrics
        registry.register(Box::new(ticks.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(deliveries_failed.clone()))?;
        registry.register(Box::new(snapshot_symbols.clone()))?;

        Ok(Self {
            registry,
            ticks,
            upstream_latency,
            upstream_failures,
            subscribers,
            deliveries_failed,
            snapshot_symbols,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
