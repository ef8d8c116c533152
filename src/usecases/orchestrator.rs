//! Stream Orchestrator - Hot-Swappable Ingestion Engine
//!
//! Owns the single active ingestion strategy and the current
//! exchange/pair. Reconfiguration is serialised by an async mutex: the
//! old run-loop is stopped and awaited before its replacement starts, so
//! at most one strategy is ever running.
//!
//! Observations bypass the lock entirely. They flow through a
//! [`PriceRelay`] that stores the latest price, stamps a monotonic
//! timestamp and publishes a `TICKER` message to every subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::domain::error::StreamError;
use crate::domain::market::{Pair, PriceObservation};
use crate::domain::message::{Message, TickerPayload};

use super::ingestion::{
  ObservationSink, ObservationTarget, PollFeedStrategy, PollSettings, PushFeedStrategy, PushSettings, Strategy,
  StrategyGauge, StrategyKind,
};
use super::registry::SubscriberRegistry;
use super::venues::VenueDirectory;

/// Engine defaults and strategy timing.
#[derive(Debug, Clone)]
pub struct StreamSettings {
  /// Exchange used by `start_engine`.
  pub push_exchange: String,
  /// Pair used by `start_engine`.
  pub default_pair: Pair,
  pub push: PushSettings,
  pub poll: PollSettings,
}

impl Default for StreamSettings {
  fn default() -> Self {
    Self {
      push_exchange: "binance".to_string(),
      default_pair: Pair::default(),
      push: PushSettings::default(),
      poll: PollSettings::default(),
    }
  }
}

/// Read-only view of the engine state, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSnapshot {
  pub exchange: String,
  pub pair: Pair,
  /// Kind of the active strategy, `None` while idle.
  pub strategy: Option<StrategyKind>,
  pub running: bool,
}

/// Orchestrator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
  pub observations_published: u64,
  pub strategy_swaps: u64,
  pub running_strategies: usize,
  pub peak_running_strategies: usize,
}

// ─── Observation relay ───

/// Turns observations into `TICKER` messages.
pub struct PriceRelay {
  /// `f64` bits of the latest price; 0 until the first observation.
  latest_price: AtomicU64,
  /// Last issued timestamp (Unix ms). Held while publishing so stamps
  /// follow publish order.
  last_stamp: SyncMutex<u64>,
  registry: Arc<SubscriberRegistry>,
  published: AtomicU64,
}

impl PriceRelay {
  fn new(registry: Arc<SubscriberRegistry>) -> Self {
    Self {
      latest_price: AtomicU64::new(0),
      last_stamp: SyncMutex::new(0),
      registry,
      published: AtomicU64::new(0),
    }
  }

  fn latest_price(&self) -> Option<f64> {
    let price = f64::from_bits(self.latest_price.load(Ordering::Acquire));
    (price > 0.0).then_some(price)
  }
}

impl ObservationTarget for PriceRelay {
  fn observe(&self, observation: PriceObservation) {
    self
      .latest_price
      .store(observation.price.to_bits(), Ordering::Release);

    let observed_ms = u64::try_from(observation.observed_at.timestamp_millis()).unwrap_or(0);
    let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);

    let mut last = self.last_stamp.lock();
    let timestamp = observed_ms.max(now_ms).max(*last);
    *last = timestamp;

    let message = Message::Ticker(TickerPayload {
      exchange: observation.exchange,
      pair: observation.pair,
      price: observation.price,
      timestamp,
    });
    let report = self.registry.publish(&message);
    drop(last);

    self.published.fetch_add(1, Ordering::Relaxed);
    if report.dropped > 0 {
      debug!(dropped = report.dropped, "Ticker dropped for slow subscribers");
    }
  }
}

// ─── Orchestrator ───

struct EngineState {
  exchange: String,
  pair: Pair,
  active: Option<Strategy>,
}

/// State shared with reconfiguration tasks.
struct Engine {
  /// Reconfiguration lock.
  state: Mutex<EngineState>,
  relay: Arc<PriceRelay>,
  gauge: Arc<StrategyGauge>,
  snapshot_tx: watch::Sender<StreamSnapshot>,
  swaps: AtomicU64,
}

impl Engine {
  /// Stop the active strategy, then launch `strategy` on `exchange`/`pair`.
  async fn swap(&self, exchange: String, pair: Pair, strategy: Strategy) {
    let mut state = self.state.lock().await;

    if let Some(mut old) = state.active.take() {
      debug!(exchange = %old.exchange(), kind = %old.kind(), "Stopping active strategy");
      old.stop().await;
    }

    let kind = strategy.kind();
    self.launch(&mut state, exchange, pair, strategy);
    self.swaps.fetch_add(1, Ordering::Relaxed);

    info!(exchange = %state.exchange, pair = %state.pair, kind = %kind, "Stream switched");
  }

  /// Stop the active strategy and publish an idle snapshot.
  async fn halt(&self) {
    let mut state = self.state.lock().await;

    if let Some(mut old) = state.active.take() {
      old.stop().await;
      info!(exchange = %state.exchange, pair = %state.pair, "Stream engine stopped");
    }

    self.snapshot_tx.send_replace(StreamSnapshot {
      exchange: state.exchange.clone(),
      pair: state.pair.clone(),
      strategy: None,
      running: false,
    });
  }

  /// Update state, start `strategy` and publish the new snapshot.
  /// Caller holds the reconfiguration lock.
  fn launch(&self, state: &mut EngineState, exchange: String, pair: Pair, mut strategy: Strategy) {
    if state.active.is_some() {
      warn!("Launching over an active strategy");
    }

    let target: Arc<dyn ObservationTarget> = self.relay.clone();
    strategy.start(pair.clone(), ObservationSink::new(target, Arc::clone(&self.gauge)));

    self.snapshot_tx.send_replace(StreamSnapshot {
      exchange: exchange.clone(),
      pair: pair.clone(),
      strategy: Some(strategy.kind()),
      running: true,
    });

    state.exchange = exchange;
    state.pair = pair;
    state.active = Some(strategy);
  }
}

/// Owns the active strategy and serialises reconfiguration.
///
/// `change_stream` and `shutdown` run their stop/start sequence on a
/// spawned task: a caller that stops waiting never leaves the engine
/// half-switched.
pub struct StreamOrchestrator {
  venues: VenueDirectory,
  settings: StreamSettings,
  engine: Arc<Engine>,
}

impl StreamOrchestrator {
  /// Create an idle orchestrator publishing into `registry`.
  pub fn new(venues: VenueDirectory, registry: Arc<SubscriberRegistry>, settings: StreamSettings) -> Self {
    let initial = StreamSnapshot {
      exchange: settings.push_exchange.to_ascii_lowercase(),
      pair: settings.default_pair.clone(),
      strategy: None,
      running: false,
    };
    let (snapshot_tx, _) = watch::channel(initial.clone());

    Self {
      venues,
      settings,
      engine: Arc::new(Engine {
        state: Mutex::new(EngineState {
          exchange: initial.exchange,
          pair: initial.pair,
          active: None,
        }),
        relay: Arc::new(PriceRelay::new(registry)),
        gauge: Arc::new(StrategyGauge::new()),
        snapshot_tx,
        swaps: AtomicU64::new(0),
      }),
    }
  }

  /// Start the default push exchange and pair. Only valid while idle.
  #[instrument(skip(self))]
  pub async fn start_engine(&self) -> Result<(), StreamError> {
    let mut state = self.engine.state.lock().await;

    if let Some(active) = state.active.as_ref() {
      return Err(StreamError::AlreadyRunning {
        exchange: active.exchange().to_string(),
        pair: state.pair.to_string(),
      });
    }

    let exchange = self.settings.push_exchange.to_ascii_lowercase();
    let pair = self.settings.default_pair.clone();
    let strategy = self.build_strategy(&exchange)?;

    self.engine.launch(&mut state, exchange, pair, strategy);
    info!(exchange = %state.exchange, pair = %state.pair, "Stream engine started");
    Ok(())
  }

  /// Switch to a new exchange/pair.
  ///
  /// Input is validated before the lock is taken; a rejected request
  /// leaves the running strategy untouched. Once accepted, the switch
  /// completes even if the returned future is dropped.
  #[instrument(skip(self))]
  pub async fn change_stream(&self, exchange: &str, pair: &str) -> Result<(), StreamError> {
    let pair: Pair = pair.parse()?;
    let exchange = exchange.to_ascii_lowercase();
    let strategy = self.build_strategy(&exchange)?;

    let engine = Arc::clone(&self.engine);
    let swap = tokio::spawn(async move { engine.swap(exchange, pair, strategy).await }.in_current_span());
    join_reconfiguration(swap).await;
    Ok(())
  }

  /// Stop the active strategy and return to idle.
  #[instrument(skip(self))]
  pub async fn shutdown(&self) {
    let engine = Arc::clone(&self.engine);
    let halt = tokio::spawn(async move { engine.halt().await }.in_current_span());
    join_reconfiguration(halt).await;
  }

  /// Most recent observed price, if any.
  pub fn latest_price(&self) -> Option<f64> {
    self.engine.relay.latest_price()
  }

  /// Current engine state.
  pub fn snapshot(&self) -> StreamSnapshot {
    self.engine.snapshot_tx.borrow().clone()
  }

  /// Subscribe to engine state transitions.
  pub fn watch_state(&self) -> watch::Receiver<StreamSnapshot> {
    self.engine.snapshot_tx.subscribe()
  }

  /// Live/peak run-loop counter.
  pub fn gauge(&self) -> Arc<StrategyGauge> {
    Arc::clone(&self.engine.gauge)
  }

  /// Venues this orchestrator can switch between.
  pub fn venues(&self) -> &VenueDirectory {
    &self.venues
  }

  pub fn stats(&self) -> OrchestratorStats {
    OrchestratorStats {
      observations_published: self.engine.relay.published.load(Ordering::Relaxed),
      strategy_swaps: self.engine.swaps.load(Ordering::Relaxed),
      running_strategies: self.engine.gauge.current(),
      peak_running_strategies: self.engine.gauge.peak(),
    }
  }

  /// Push strategy when the venue has a push channel, poll otherwise.
  fn build_strategy(&self, exchange: &str) -> Result<Strategy, StreamError> {
    let venue = self.venues.get(exchange)?;

    Ok(match &venue.push {
      Some(feed) => Strategy::Push(PushFeedStrategy::new(exchange, Arc::clone(feed), self.settings.push)),
      None => Strategy::Poll(PollFeedStrategy::new(
        exchange,
        Arc::clone(&venue.client),
        self.settings.poll,
      )),
    })
  }
}

/// Wait for a reconfiguration task, re-raising its panic if it had one.
async fn join_reconfiguration(task: JoinHandle<()>) {
  if let Err(e) = task.await {
    if e.is_panic() {
      std::panic::resume_unwind(e.into_panic());
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use async_trait::async_trait;
  use futures_util::{StreamExt, stream};

  use super::*;
  use crate::domain::market::{Candle, Trade};
  use crate::ports::exchange::ExchangeClient;
  use crate::ports::push_feed::{PushFeed, PushTick, TickStream};

  struct FixedTicker(f64);

  #[async_trait]
  impl ExchangeClient for FixedTicker {
    fn name(&self) -> &str {
      "fixed"
    }

    async fn fetch_ticker(&self, _pair: &Pair) -> anyhow::Result<f64> {
      Ok(self.0)
    }

    async fn fetch_trades(&self, _pair: &Pair, _limit: usize) -> anyhow::Result<Vec<Trade>> {
      Ok(vec![])
    }

    async fn fetch_candles(&self, _pair: &Pair, _timeframe: &str, _limit: usize) -> anyhow::Result<Vec<Candle>> {
      Ok(vec![])
    }
  }

  /// One tick per session, then an idle channel.
  struct OneTick(f64);

  #[async_trait]
  impl PushFeed for OneTick {
    async fn connect(&self, _pair: &Pair) -> anyhow::Result<TickStream> {
      let tick = PushTick {
        price: self.0,
        quantity: 1.0,
        timestamp_ms: 0,
      };
      Ok(stream::iter([Ok(tick)]).chain(stream::pending()).boxed())
    }
  }

  fn venues() -> VenueDirectory {
    VenueDirectory::new()
      .with_venue("binance", Arc::new(FixedTicker(1.0)), Some(Arc::new(OneTick(50_000.0))))
      .with_venue("kraken", Arc::new(FixedTicker(50_100.0)), None)
  }

  fn orchestrator() -> (StreamOrchestrator, Arc<SubscriberRegistry>) {
    let registry = Arc::new(SubscriberRegistry::default());
    let orch = StreamOrchestrator::new(venues(), Arc::clone(&registry), StreamSettings::default());
    (orch, registry)
  }

  #[tokio::test(start_paused = true)]
  async fn test_start_engine_publishes_ticker() {
    let (orch, registry) = orchestrator();
    let mut sub = registry.subscribe().unwrap();

    orch.start_engine().await.unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();

    match msg {
      Message::Ticker(t) => {
        assert_eq!(t.exchange, "binance");
        assert_eq!(t.pair.to_string(), "BTC/USDT");
        assert_eq!(t.price, 50_000.0);
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(orch.latest_price(), Some(50_000.0));

    let snap = orch.snapshot();
    assert!(snap.running);
    assert_eq!(snap.strategy, Some(StrategyKind::Push));
    orch.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_start_engine_twice_is_rejected() {
    let (orch, _registry) = orchestrator();
    orch.start_engine().await.unwrap();

    let err = orch.start_engine().await.unwrap_err();
    assert!(matches!(err, StreamError::AlreadyRunning { .. }));
    assert_eq!(orch.gauge().current(), 1);
    orch.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejected_change_leaves_strategy_running() {
    let (orch, _registry) = orchestrator();
    orch.start_engine().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
      orch.change_stream("ftx", "BTC/USDT").await.unwrap_err(),
      StreamError::UnknownExchange("ftx".to_string())
    );
    assert!(matches!(
      orch.change_stream("kraken", "BTCUSDT").await.unwrap_err(),
      StreamError::InvalidPair(_)
    ));

    let snap = orch.snapshot();
    assert_eq!(snap.exchange, "binance");
    assert!(snap.running);
    assert_eq!(orch.gauge().current(), 1);
    assert_eq!(orch.stats().strategy_swaps, 0);
    orch.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_change_to_poll_venue() {
    let (orch, registry) = orchestrator();
    orch.start_engine().await.unwrap();
    let mut state = orch.watch_state();

    orch.change_stream("Kraken", "eth/usdt").await.unwrap();
    assert!(state.has_changed().unwrap());

    let snap = state.borrow_and_update().clone();
    assert_eq!(snap.exchange, "kraken");
    assert_eq!(snap.pair.to_string(), "ETH/USDT");
    assert_eq!(snap.strategy, Some(StrategyKind::Poll));

    let mut sub = registry.subscribe().unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(3), sub.recv()).await.unwrap().unwrap();
    assert!(matches!(msg, Message::Ticker(t) if t.exchange == "kraken" && t.price == 50_100.0));

    assert_eq!(orch.stats().peak_running_strategies, 1);
    orch.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_abandoned_change_still_completes() {
    let (orch, _registry) = orchestrator();
    orch.change_stream("kraken", "BTC/USDT").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let mut state = orch.watch_state();

    // Caller gives up before the old strategy has been stopped.
    let abandoned = tokio::time::timeout(Duration::ZERO, orch.change_stream("binance", "ETH/USDT")).await;
    assert!(abandoned.is_err());

    let snap = tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| s.exchange == "binance"))
      .await
      .unwrap()
      .unwrap()
      .clone();
    assert!(snap.running);
    assert_eq!(snap.strategy, Some(StrategyKind::Push));
    assert_eq!(snap.pair.to_string(), "ETH/USDT");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(orch.gauge().current(), 1);
    assert!(matches!(orch.start_engine().await, Err(StreamError::AlreadyRunning { .. })));
    assert_eq!(orch.stats().strategy_swaps, 2);
    orch.shutdown().await;
    assert_eq!(orch.gauge().current(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_shutdown_goes_idle_and_stops_publishing() {
    let (orch, registry) = orchestrator();
    orch.change_stream("kraken", "BTC/USDT").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    orch.shutdown().await;
    assert!(!orch.snapshot().running);
    assert_eq!(orch.gauge().current(), 0);

    let mut sub = registry.subscribe().unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(sub.try_recv().is_none());

    orch.start_engine().await.unwrap();
    orch.shutdown().await;
  }

  #[test]
  fn test_relay_timestamps_never_decrease() {
    let registry = Arc::new(SubscriberRegistry::default());
    let mut sub = registry.subscribe().unwrap();
    let relay = PriceRelay::new(Arc::clone(&registry));
    let pair: Pair = "BTC/USDT".parse().unwrap();

    let mut future = PriceObservation::now("binance", pair.clone(), 1.0);
    future.observed_at += chrono::Duration::seconds(60);
    relay.observe(future);
    relay.observe(PriceObservation::now("binance", pair, 2.0));

    let stamps: Vec<u64> = std::iter::from_fn(|| sub.try_recv())
      .map(|m| match m {
        Message::Ticker(t) => t.timestamp,
        other => panic!("unexpected {other:?}"),
      })
      .collect();
    assert_eq!(stamps.len(), 2);
    assert!(stamps[1] >= stamps[0]);
    assert_eq!(relay.latest_price(), Some(2.0));
  }
}
