//! Metron Stream — Entry Point
//!
//! Initializes configuration, logging, venue adapters and the stream
//! engine. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build venue directory (REST client per venue + push feed where configured)
//! 4. Create subscriber registry and connection manager
//! 5. Start the orchestrator on the default push exchange/pair
//! 6. Spawn the resilient poller (sentiment, trades, arbitrage)
//! 7. Spawn metrics sampler, metrics server and health server
//! 8. Spawn config watcher; stream changes apply via change_stream
//! 9. Wait for SIGINT → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use metron_stream::adapters::analytics::RemoteSentiment;
use metron_stream::adapters::exchange::{HttpClientConfig, RestExchangeClient};
use metron_stream::adapters::feeds::BinancePushFeed;
use metron_stream::adapters::metrics::{EngineSample, HealthServer, HealthState, MetricsRegistry};
use metron_stream::config::hot_reload::{ConfigWatcher, DEFAULT_RELOAD_INTERVAL};
use metron_stream::config::{self, AppConfig};
use metron_stream::ports::{ExchangeClient, PushFeed};
use metron_stream::usecases::{
    ArbitrageScanner, ConnectionManager, PollerStats, ResilientPoller, StreamOrchestrator,
    SubscriberRegistry, VenueDirectory,
};

/// Interval between metrics samples.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.service.log_level)
            }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        venues = config.venues.len(),
        push_exchange = %config.stream.push_exchange,
        pair = %config.stream.default_pair,
        "Starting Metron Stream"
    );

    // ── 3. Shutdown token ───────────────────────────────────
    let shutdown = CancellationToken::new();

    // ── 4. Venue adapters ───────────────────────────────────
    let venues = build_venues(&config)?;

    // ── 5. Fan-out: subscribers + connections ───────────────
    let registry = Arc::new(SubscriberRegistry::new(
        config.stream.subscriber_capacity,
        config.stream.max_subscribers,
    ));
    let connections = Arc::new(ConnectionManager::new(Duration::from_millis(
        config.connections.send_timeout_ms,
    )));

    // ── 6. Orchestrator ─────────────────────────────────────
    let orchestrator = Arc::new(StreamOrchestrator::new(
        venues.clone(),
        Arc::clone(&registry),
        config.stream_settings()?,
    ));
    orchestrator
        .start_engine()
        .await
        .context("Failed to start stream engine")?;

    // ── 7. Resilient poller ─────────────────────────────────
    let analyzer = Arc::new(
        RemoteSentiment::new(
            config.analytics.url.clone(),
            Duration::from_millis(config.analytics.timeout_ms),
        )
        .context("Failed to create analytics client")?,
    );
    let scanner = ArbitrageScanner::new(
        venues.clients(),
        Duration::from_millis(config.poller.venue_timeout_ms),
    );
    let poller = ResilientPoller::new(
        orchestrator.watch_state(),
        venues,
        analyzer,
        Arc::clone(&connections),
        scanner,
        config.poller_settings(),
    );
    let poller_stats = poller.stats();
    let poller_handle = tokio::spawn(poller.run(shutdown.child_token()));

    // ── 8. Metrics + health ─────────────────────────────────
    let mut server_handles = Vec::new();
    if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);

        server_handles.push(tokio::spawn(sample_metrics(
            Arc::clone(&metrics),
            Arc::clone(&orchestrator),
            Arc::clone(&registry),
            Arc::clone(&connections),
            Arc::clone(&poller_stats),
            shutdown.child_token(),
        )));

        let metrics_shutdown = shutdown.child_token();
        let bind_address = config.metrics.bind_address.clone();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }

    let health = HealthServer::new(
        Arc::new(HealthState::new(orchestrator.watch_state())),
        config.metrics.health_port,
    );
    let health_shutdown = shutdown.child_token();
    server_handles.push(tokio::spawn(async move {
        if let Err(e) = health.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    }));

    // ── 9. Config hot-reload ────────────────────────────────
    let (watcher, config_rx) =
        ConfigWatcher::new(&config_path, config.clone(), DEFAULT_RELOAD_INTERVAL);
    server_handles.push(tokio::spawn(watcher.run(shutdown.child_token())));
    server_handles.push(tokio::spawn(apply_config_changes(
        config_rx,
        Arc::clone(&orchestrator),
        shutdown.child_token(),
    )));

    info!("All tasks spawned, engine is running");

    // ── 10. Wait for SIGINT ─────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // ── Graceful shutdown ──

    // 1. Signal all tasks to stop
    shutdown.cancel();

    // 2. Stop the active strategy (readiness probe → 503)
    orchestrator.shutdown().await;

    // 3. Wait for the poller to finish its cycle (up to 10s)
    if tokio::time::timeout(Duration::from_secs(10), poller_handle)
        .await
        .is_err()
    {
        warn!("Poller did not stop within 10s");
    }

    // 4. Wait for servers and background tasks (up to 5s)
    for handle in server_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    let stats = orchestrator.stats();
    info!(
        published = stats.observations_published,
        swaps = stats.strategy_swaps,
        dropped = registry.stats().dropped_total,
        "Shutdown complete"
    );
    Ok(())
}

/// Build one REST client per venue, plus a push feed where a `ws_url` is set.
fn build_venues(config: &AppConfig) -> Result<VenueDirectory> {
    let mut venues = VenueDirectory::new();

    for venue in &config.venues {
        let client: Arc<dyn ExchangeClient> = Arc::new(
            RestExchangeClient::new(
                venue.name.to_ascii_lowercase(),
                HttpClientConfig {
                    base_url: venue.rest_url.clone(),
                    requests_per_second: venue.requests_per_second,
                    ..Default::default()
                },
            )
            .with_context(|| format!("Failed to create REST client for {}", venue.name))?,
        );
        let push = venue
            .ws_url
            .as_ref()
            .map(|url| Arc::new(BinancePushFeed::new(url.clone())) as Arc<dyn PushFeed>);

        info!(
            venue = %venue.name,
            rest = %venue.rest_url,
            push = push.is_some(),
            "Venue registered"
        );
        venues.register(&venue.name, client, push);
    }

    Ok(venues)
}

/// Switch the stream when the reloaded config names a new default
/// exchange or pair.
async fn apply_config_changes(
    mut config_rx: watch::Receiver<AppConfig>,
    orchestrator: Arc<StreamOrchestrator>,
    shutdown: CancellationToken,
) {
    let mut current = config_rx.borrow_and_update().clone();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            changed = config_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let next = config_rx.borrow_and_update().clone();

        if next.venues != current.venues {
            warn!("Venue changes require a restart; ignoring them");
        }

        let stream_changed = !next
            .stream
            .push_exchange
            .eq_ignore_ascii_case(&current.stream.push_exchange)
            || next.stream.default_pair != current.stream.default_pair;

        if stream_changed {
            match orchestrator
                .change_stream(&next.stream.push_exchange, &next.stream.default_pair)
                .await
            {
                Ok(()) => info!(
                    exchange = %next.stream.push_exchange,
                    pair = %next.stream.default_pair,
                    "Stream reconfigured from config"
                ),
                Err(e) => warn!(error = %e, "Config stream change rejected"),
            }
        }

        current = next;
    }
}

/// Periodically copy engine counters into Prometheus.
async fn sample_metrics(
    metrics: Arc<MetricsRegistry>,
    orchestrator: Arc<StreamOrchestrator>,
    registry: Arc<SubscriberRegistry>,
    connections: Arc<ConnectionManager>,
    poller: Arc<PollerStats>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(SAMPLE_INTERVAL);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let engine = orchestrator.stats();
        let subscribers = registry.stats();
        #[allow(clippy::cast_precision_loss)]
        let backoff_secs = poller.backoff_ms.load(Ordering::Relaxed) as f64 / 1000.0;

        metrics.record(&EngineSample {
            ticks_published: engine.observations_published,
            subscriber_drops: subscribers.dropped_total,
            connection_timeouts: connections.timed_out_total(),
            connection_removals: connections.removed_total(),
            subscribers: subscribers.subscribers,
            connections: connections.len(),
            running_strategies: engine.running_strategies,
            strategy_swaps: engine.strategy_swaps,
            poller_errors: poller.cycles_failed.load(Ordering::Relaxed),
            poller_backoff_secs: backoff_secs,
            latest_price: orchestrator.latest_price(),
        });
    }
}
