//! Price Broadcaster - The Poll → Fetch → Broadcast Loop
//!
//! The single long-lived scheduling task of the relay. Each tick:
//! 1. Reads the bearer token (missing → long backoff)
//! 2. Resolves the catalog (empty → skip, normal interval)
//! 3. Fetches every instrument's LTP in one batched request
//! 4. Reassembles a per-category snapshot (failed fetch → all null)
//! 5. Pushes it to a membership snapshot of the subscriber set,
//!    pruning members whose send fails
//!
//! Ticks never overlap: the next one starts a fixed delay after the
//! previous one ends, so a slow upstream lowers the polling rate.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::{broadcast, watch};
use tracing::{Span, debug, error, info, instrument, warn};

use super::subscriber_set::SubscriberSet;
use super::symbol_resolver::SymbolResolver;
use crate::adapters::metrics::{HealthState, MetricsRegistry};
use crate::config::BroadcastConfig;
use crate::domain::catalog::build_instrument_index;
use crate::domain::errors::TickError;
use crate::domain::snapshot::{PriceSnapshot, assemble_snapshot};
use crate::ports::catalog_store::CatalogStore;
use crate::ports::quote_source::QuoteSource;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next tick.
    Idle,
    /// Resolving credentials and catalog, or waiting on the quote batch.
    Fetching,
    /// Snapshot ready, pushing to subscribers.
    Delivering,
}

/// Summary of one delivered snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers in the membership snapshot.
    pub attempted: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Subscribers removed after a failed send.
    pub pruned: usize,
    /// Symbols in the snapshot.
    pub symbols: usize,
    /// Symbols that carried a price.
    pub priced: usize,
    /// Whether the batched quote request succeeded.
    pub upstream_ok: bool,
}

/// What a tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// A snapshot was built and pushed.
    Delivered(DeliveryReport),
    /// The tick stopped before fetching prices.
    Skipped(TickError),
}

impl TickOutcome {
    /// Metric label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Delivered(_) => "delivered",
            Self::Skipped(reason) => reason.kind(),
        }
    }
}

/// The broadcast loop.
pub struct PriceBroadcaster<S: CatalogStore + ?Sized, Q: QuoteSource + ?Sized> {
    /// Token and catalog resolution.
    resolver: SymbolResolver<S>,
    /// Batched quote provider.
    quotes: Arc<Q>,
    /// Live subscribers, shared with the gateway.
    subscribers: Arc<SubscriberSet>,
    /// Prometheus metrics.
    metrics: Arc<MetricsRegistry>,
    /// Readiness state.
    health: Arc<HealthState>,
    /// Tick timing.
    config: BroadcastConfig,
    /// Current loop state, observable by anyone holding a receiver.
    state_tx: watch::Sender<LoopState>,
    /// Ticks started since construction.
    ticks: AtomicU64,
}

impl<S: CatalogStore + ?Sized, Q: QuoteSource + ?Sized> PriceBroadcaster<S, Q> {
    pub fn new(
        resolver: SymbolResolver<S>,
        quotes: Arc<Q>,
        subscribers: Arc<SubscriberSet>,
        metrics: Arc<MetricsRegistry>,
        health: Arc<HealthState>,
        config: BroadcastConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(LoopState::Idle);

        Self {
            resolver,
            quotes,
            subscribers,
            metrics,
            health,
            config,
            state_tx,
            ticks: AtomicU64::new(0),
        }
    }

    /// Watch the loop state.
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state_tx.subscribe()
    }

    /// Ticks started since construction.
    pub fn ticks_started(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    /// Run ticks until shutdown.
    ///
    /// A tick in flight when shutdown arrives is allowed to finish.
    #[instrument(skip_all, name = "broadcast_loop")]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            tick_ms = self.config.tick_interval_ms,
            backoff_ms = self.config.credential_backoff_ms,
            categories = ?self.resolver.categories(),
            "Price broadcast loop started"
        );
        self.health.set_loop_running(true);

        loop {
            let outcome = self.run_tick().await;
            self.health.record_tick();
            let delay = self.delay_after(&outcome);

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Broadcast loop received shutdown signal");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.health.set_loop_running(false);
        self.set_state(LoopState::Idle);
        info!("Price broadcast loop stopped");
    }

    /// Delay before the next tick, measured from the end of this one.
    pub fn delay_after(&self, outcome: &TickOutcome) -> Duration {
        match outcome {
            TickOutcome::Skipped(TickError::CredentialUnavailable(_)) => {
                self.config.credential_backoff()
            }
            _ => self.config.tick_interval(),
        }
    }

    /// Execute one tick. Every failure is absorbed into the outcome.
    #[instrument(skip(self), fields(tick = tracing::field::Empty))]
    pub async fn run_tick(&self) -> TickOutcome {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        Span::current().record("tick", tick);
        self.set_state(LoopState::Fetching);

        let outcome = match self.fetch_and_deliver().await {
            Ok(report) => TickOutcome::Delivered(report),
            Err(reason) => {
                match &reason {
                    TickError::CredentialUnavailable(_) => warn!(
                        error = %reason,
                        backoff_ms = self.config.credential_backoff_ms,
                        "Skipping tick"
                    ),
                    _ => info!(reason = %reason, "Skipping tick, nothing to report"),
                }
                TickOutcome::Skipped(reason)
            }
        };

        self.metrics.ticks.with_label_values(&[outcome.label()]).inc();
        self.set_state(LoopState::Idle);
        outcome
    }

    async fn fetch_and_deliver(&self) -> Result<DeliveryReport, TickError> {
        let token = self.resolver.resolve_token().await?;

        let catalog = self.resolver.resolve_catalog().await;
        if catalog.is_empty() {
            return Err(TickError::CatalogUnavailable {
                categories: catalog.category_count(),
            });
        }

        let index = build_instrument_index(&catalog);

        let started = Instant::now();
        let fetched = self.quotes.last_prices(&token, &index.ids).await;
        self.metrics
            .upstream_latency
            .observe(started.elapsed().as_secs_f64());

        let (quotes, upstream_ok) = match fetched {
            Ok(quotes) => (quotes, true),
            Err(source) => {
                let err = TickError::UpstreamRequestFailed {
                    instruments: index.len(),
                    source,
                };
                warn!(error = %err, "Broadcasting snapshot without prices");
                self.metrics.upstream_failures.inc();
                (HashMap::new(), false)
            }
        };

        let snapshot = assemble_snapshot(&catalog, &index, &quotes);
        self.metrics
            .snapshot_symbols
            .with_label_values(&["priced"])
            .set(gauge_value(snapshot.priced_count()));
        self.metrics
            .snapshot_symbols
            .with_label_values(&["unavailable"])
            .set(gauge_value(snapshot.symbol_count() - snapshot.priced_count()));

        self.set_state(LoopState::Delivering);
        Ok(self.deliver(&snapshot, upstream_ok).await)
    }

    /// Push `snapshot` to every current subscriber, pruning failures.
    async fn deliver(&self, snapshot: &PriceSnapshot, upstream_ok: bool) -> DeliveryReport {
        let mut report = DeliveryReport {
            symbols: snapshot.symbol_count(),
            priced: snapshot.priced_count(),
            upstream_ok,
            ..DeliveryReport::default()
        };

        let payload: Arc<str> = match snapshot.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                error!(error = %e, "Failed to serialize snapshot");
                return report;
            }
        };

        let members = self.subscribers.snapshot();
        report.attempted = members.len();

        let results = join_all(members.iter().map(|subscriber| {
            let payload = Arc::clone(&payload);
            async move { (subscriber.id(), subscriber.send(payload).await) }
        }))
        .await;

        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(source) => {
                    let reason = source.reason();
                    let err = TickError::SubscriberDeliveryFailed {
                        subscriber: id,
                        source,
                    };
                    warn!(subscriber = %id, error = %err, "Pruning subscriber");
                    self.subscribers.remove(&id);
                    self.metrics
                        .deliveries_failed
                        .with_label_values(&[reason])
                        .inc();
                    report.pruned += 1;
                }
            }
        }

        if report.attempted == 0 {
            debug!(symbols = report.symbols, "Snapshot built, no subscribers");
        } else {
            info!(
                subscribers = report.attempted,
                delivered = report.delivered,
                pruned = report.pruned,
                symbols = report.symbols,
                priced = report.priced,
                upstream_ok,
                "Snapshot broadcast"
            );
        }

        report
    }

    fn set_state(&self, state: LoopState) {
        self.state_tx.send_replace(state);
    }
}

fn gauge_value(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
