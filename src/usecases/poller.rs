//! Resilient Poller - Periodic Analytics Broadcast
//!
//! Each cycle fetches candles for the current exchange/pair, asks the
//! sentiment analyzer for a verdict, fetches recent trades, and every
//! few cycles runs a cross-venue arbitrage scan. Results go straight to
//! the live connections.
//!
//! Cycle pacing:
//! - no connections: wait `idle_interval`, make no upstream call
//! - success: reset the error counter, wait `cycle_interval`
//! - failure: bump the error counter, wait `min(cap, base * errors)`

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::backoff::ErrorBackoff;
use crate::domain::message::{Message, SentimentPayload, TradesPayload};

use super::arbitrage::ArbitrageScanner;
use super::connections::ConnectionManager;
use super::orchestrator::StreamSnapshot;
use super::venues::VenueDirectory;
use crate::ports::analytics::SentimentAnalyzer;

/// Poller timing and request sizes.
#[derive(Debug, Clone)]
pub struct PollerSettings {
  /// Pause while nobody is connected.
  pub idle_interval: Duration,
  /// Pause after a successful cycle.
  pub cycle_interval: Duration,
  /// First error delay; grows linearly per consecutive error.
  pub backoff_base: Duration,
  /// Error delay ceiling.
  pub backoff_cap: Duration,
  /// Run the arbitrage scan every N completed cycles.
  pub arbitrage_every: u32,
  /// Candle timeframe sent to the exchange (e.g. `1m`).
  pub candle_timeframe: String,
  pub candle_limit: usize,
  pub trade_limit: usize,
}

impl Default for PollerSettings {
  fn default() -> Self {
    Self {
      idle_interval: Duration::from_secs(3),
      cycle_interval: Duration::from_secs(2),
      backoff_base: Duration::from_secs(2),
      backoff_cap: Duration::from_secs(30),
      arbitrage_every: 5,
      candle_timeframe: "1m".to_string(),
      candle_limit: 100,
      trade_limit: 50,
    }
  }
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
  /// No connections; nothing fetched.
  Idle,
  /// Sentiment and trades broadcast; `arbitrage` when a scan was broadcast too.
  Completed { arbitrage: bool },
  /// The cycle failed; wait `delay` before the next one.
  Failed { errors: u32, delay: Duration },
}

/// Shared poller counters, readable while the poller runs.
#[derive(Debug, Default)]
pub struct PollerStats {
  pub cycles_completed: AtomicU64,
  pub cycles_failed: AtomicU64,
  pub idle_cycles: AtomicU64,
  pub arbitrage_broadcasts: AtomicU64,
  pub consecutive_errors: AtomicU32,
  /// Last error delay in milliseconds; 0 after a success.
  pub backoff_ms: AtomicU64,
}

pub struct ResilientPoller {
  state: watch::Receiver<StreamSnapshot>,
  venues: VenueDirectory,
  analyzer: Arc<dyn SentimentAnalyzer>,
  connections: Arc<ConnectionManager>,
  scanner: ArbitrageScanner,
  settings: PollerSettings,
  backoff: ErrorBackoff,
  completed: u64,
  stats: Arc<PollerStats>,
}

impl ResilientPoller {
  pub fn new(
    state: watch::Receiver<StreamSnapshot>,
    venues: VenueDirectory,
    analyzer: Arc<dyn SentimentAnalyzer>,
    connections: Arc<ConnectionManager>,
    scanner: ArbitrageScanner,
    settings: PollerSettings,
  ) -> Self {
    let backoff = ErrorBackoff::new(settings.backoff_base, settings.backoff_cap);
    Self {
      state,
      venues,
      analyzer,
      connections,
      scanner,
      settings,
      backoff,
      completed: 0,
      stats: Arc::new(PollerStats::default()),
    }
  }

  /// Counters shared with the metrics sampler.
  pub fn stats(&self) -> Arc<PollerStats> {
    Arc::clone(&self.stats)
  }

  /// Run cycles until `shutdown` is cancelled.
  #[instrument(skip_all, name = "poller")]
  pub async fn run(mut self, shutdown: CancellationToken) {
    info!("Poller started");

    loop {
      let outcome = tokio::select! {
        () = shutdown.cancelled() => break,
        outcome = self.step() => outcome,
      };

      let pause = self.pause_after(outcome);
      tokio::select! {
        () = shutdown.cancelled() => break,
        () = tokio::time::sleep(pause) => {}
      }
    }

    info!("Poller stopped");
  }

  /// Wait that follows a cycle with the given outcome.
  pub fn pause_after(&self, outcome: StepOutcome) -> Duration {
    match outcome {
      StepOutcome::Idle => self.settings.idle_interval,
      StepOutcome::Completed { .. } => self.settings.cycle_interval,
      StepOutcome::Failed { delay, .. } => delay,
    }
  }

  /// Execute one cycle without sleeping.
  pub async fn step(&mut self) -> StepOutcome {
    if self.connections.is_empty() {
      self.stats.idle_cycles.fetch_add(1, Ordering::Relaxed);
      return StepOutcome::Idle;
    }

    match self.cycle().await {
      Ok(arbitrage) => {
        self.backoff.record_success();
        self.completed += 1;
        self.stats.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.stats.consecutive_errors.store(0, Ordering::Relaxed);
        self.stats.backoff_ms.store(0, Ordering::Relaxed);
        if arbitrage {
          self.stats.arbitrage_broadcasts.fetch_add(1, Ordering::Relaxed);
        }
        StepOutcome::Completed { arbitrage }
      }
      Err(e) => {
        let delay = self.backoff.record_failure();
        let errors = self.backoff.errors();
        warn!(error = %e, errors, delay_s = delay.as_secs(), "Poller cycle failed");

        self.stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.stats.consecutive_errors.store(errors, Ordering::Relaxed);
        self
          .stats
          .backoff_ms
          .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::Relaxed);
        StepOutcome::Failed { errors, delay }
      }
    }
  }

  /// Sentiment, trades and (when due) arbitrage. Returns whether an
  /// arbitrage snapshot was broadcast.
  async fn cycle(&self) -> Result<bool> {
    let snapshot = self.state.borrow().clone();
    let client = Arc::clone(&self.venues.get(&snapshot.exchange)?.client);
    let pair = snapshot.pair;

    let candles = client
      .fetch_candles(&pair, &self.settings.candle_timeframe, self.settings.candle_limit)
      .await
      .context("fetch candles")?;
    let analysis = self
      .analyzer
      .compute_sentiment(&candles)
      .await
      .context("compute sentiment")?;

    let report = self
      .connections
      .broadcast(&Message::Sentiment(SentimentPayload {
        exchange: snapshot.exchange.clone(),
        pair: pair.clone(),
        analysis,
      }))
      .await;
    debug!(delivered = report.delivered, "Sentiment broadcast");

    let trades = client
      .fetch_trades(&pair, self.settings.trade_limit)
      .await
      .context("fetch trades")?;
    self
      .connections
      .broadcast(&Message::Trades(TradesPayload {
        exchange: snapshot.exchange,
        pair: pair.clone(),
        trades,
      }))
      .await;

    let every = u64::from(self.settings.arbitrage_every.max(1));
    if (self.completed + 1) % every != 0 {
      return Ok(false);
    }

    match self.scanner.scan(&pair).await {
      Some(arbitrage) => {
        self.connections.broadcast(&Message::Arbitrage(arbitrage)).await;
        Ok(true)
      }
      None => {
        debug!("No venue answered, skipping arbitrage broadcast");
        Ok(false)
      }
    }
  }
}
