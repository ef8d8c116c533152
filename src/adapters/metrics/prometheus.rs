//! Prometheus Metrics Registry - Stream Observability
//!
//! Registers and exposes Prometheus metrics for the distribution engine:
//! published ticks, per-path drops, subscriber/connection counts,
//! running strategies and poller health.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Point-in-time reading of the engine's counters.
///
/// Totals are cumulative; the registry converts them to counter deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineSample {
    pub ticks_published: u64,
    pub subscriber_drops: u64,
    pub connection_timeouts: u64,
    pub connection_removals: u64,
    pub subscribers: usize,
    pub connections: usize,
    pub running_strategies: usize,
    pub strategy_swaps: u64,
    pub poller_errors: u64,
    pub poller_backoff_secs: f64,
    pub latest_price: Option<f64>,
}

/// Centralized Prometheus metrics for the stream engine.
///
/// All metrics follow the naming convention `metron_stream_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Ticker messages published to subscribers.
    pub ticks_published: IntCounter,
    /// Messages dropped, by delivery path.
    pub messages_dropped: IntCounterVec,
    /// Connections removed after a failed send.
    pub connections_removed: IntCounter,
    /// Registered subscribers.
    pub subscribers: IntGauge,
    /// Registered connections.
    pub connections: IntGauge,
    /// Live strategy run-loops (0 or 1).
    pub running_strategies: IntGauge,
    /// Completed stream switches.
    pub strategy_swaps: IntCounter,
    /// Failed poller cycles.
    pub poller_errors: IntCounter,
    /// Current poller error delay.
    pub poller_backoff_seconds: Gauge,
    /// Most recent observed price.
    pub latest_price: Gauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ticks_published = IntCounter::new(
            "metron_stream_ticks_published_total",
            "Ticker messages published to subscribers",
        )?;

        let messages_dropped = IntCounterVec::new(
            Opts::new(
                "metron_stream_messages_dropped_total",
                "Messages dropped for a slow consumer",
            ),
            &["path"],
        )?;

        let connections_removed = IntCounter::new(
            "metron_stream_connections_removed_total",
            "Connections removed after a failed send",
        )?;

        let subscribers = IntGauge::new("metron_stream_subscribers", "Registered subscribers")?;
        let connections = IntGauge::new("metron_stream_connections", "Registered connections")?;

        let running_strategies = IntGauge::new(
            "metron_stream_running_strategies",
            "Live ingestion run-loops (never above 1)",
        )?;

        let strategy_swaps = IntCounter::new(
            "metron_stream_strategy_swaps_total",
            "Completed stream switches",
        )?;

        let poller_errors = IntCounter::new(
            "metron_stream_poller_errors_total",
            "Failed poller cycles",
        )?;

        let poller_backoff_seconds = Gauge::new(
            "metron_stream_poller_backoff_seconds",
            "Current poller error delay in seconds",
        )?;

        let latest_price = Gauge::new(
            "metron_stream_latest_price",
            "Most recent observed price",
        )?;

        // Register all metrics
        registry.register(Box::new(ticks_published.clone()))?;
        registry.register(Box::new(messages_dropped.clone()))?;
        registry.register(Box::new(connections_removed.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(running_strategies.clone()))?;
        registry.register(Box::new(strategy_swaps.clone()))?;
        registry.register(Box::new(poller_errors.clone()))?;
        registry.register(Box::new(poller_backoff_seconds.clone()))?;
        registry.register(Box::new(latest_price.clone()))?;

        Ok(Self {
            registry,
            ticks_published,
            messages_dropped,
            connections_removed,
            subscribers,
            connections,
            running_strategies,
            strategy_swaps,
            poller_errors,
            poller_backoff_seconds,
            latest_price,
        })
    }

    /// Apply a sample. Cumulative totals only ever move counters forward.
    pub fn record(&self, sample: &EngineSample) {
        advance(&self.ticks_published, sample.ticks_published);
        advance(
            &self.messages_dropped.with_label_values(&["subscriber"]),
            sample.subscriber_drops,
        );
        advance(
            &self.messages_dropped.with_label_values(&["connection"]),
            sample.connection_timeouts,
        );
        advance(&self.connections_removed, sample.connection_removals);
        advance(&self.strategy_swaps, sample.strategy_swaps);
        advance(&self.poller_errors, sample.poller_errors);

        self.subscribers.set(gauge_value(sample.subscribers));
        self.connections.set(gauge_value(sample.connections));
        self.running_strategies
            .set(gauge_value(sample.running_strategies));
        self.poller_backoff_seconds.set(sample.poller_backoff_secs);
        if let Some(price) = sample.latest_price {
            self.latest_price.set(price);
        }
    }

    /// Render all metrics in the text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

/// Move a counter up to `total`.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

fn gauge_value(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
