//! Ingestion Strategies - Pluggable Upstream Price Sources
//!
//! A strategy runs one background run-loop that produces
//! [`PriceObservation`]s for a single exchange/pair. Two variants exist:
//! - `Push`: a long-lived streaming session, reconnected on loss
//! - `Poll`: a periodic ticker request
//!
//! Both are driven through the [`Strategy`] enum so the orchestrator can
//! swap them without knowing which one is active.

pub mod poll;
pub mod push;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::market::{Pair, PriceObservation};

pub use poll::{PollFeedStrategy, PollSettings};
pub use push::{PushFeedStrategy, PushSettings};

/// Which ingestion mechanism a strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
  Push,
  Poll,
}

impl fmt::Display for StrategyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Push => write!(f, "push"),
      Self::Poll => write!(f, "poll"),
    }
  }
}

// ─── Observation delivery ───

/// Receiver of observations produced by a run-loop.
pub trait ObservationTarget: Send + Sync + 'static {
  /// Handle one observation. Must not block.
  fn observe(&self, observation: PriceObservation);
}

/// Counts live run-loops across all strategies of one orchestrator.
#[derive(Debug, Default)]
pub struct StrategyGauge {
  current: AtomicUsize,
  peak: AtomicUsize,
}

impl StrategyGauge {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a live run-loop; released when the guard is dropped.
  pub fn enter(self: &Arc<Self>) -> GaugeGuard {
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    GaugeGuard {
      gauge: Arc::clone(self),
    }
  }

  /// Run-loops alive right now.
  pub fn current(&self) -> usize {
    self.current.load(Ordering::SeqCst)
  }

  /// Highest number of simultaneously alive run-loops ever seen.
  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

/// Keeps a run-loop counted in its [`StrategyGauge`].
#[derive(Debug)]
pub struct GaugeGuard {
  gauge: Arc<StrategyGauge>,
}

impl Drop for GaugeGuard {
  fn drop(&mut self) {
    self.gauge.current.fetch_sub(1, Ordering::SeqCst);
  }
}

/// Emission handle given to a run-loop.
///
/// Carries the run-loop's cancellation token. Once the token is cancelled
/// every further emit is discarded, so a stopped strategy can never
/// publish, even if it is still unwinding.
#[derive(Clone)]
pub struct ObservationSink {
  target: Arc<dyn ObservationTarget>,
  gauge: Arc<StrategyGauge>,
  token: CancellationToken,
}

impl ObservationSink {
  /// Create a sink with a fresh cancellation token.
  pub fn new(target: Arc<dyn ObservationTarget>, gauge: Arc<StrategyGauge>) -> Self {
    Self {
      target,
      gauge,
      token: CancellationToken::new(),
    }
  }

  /// Forward an observation unless the sink has been closed.
  ///
  /// Returns whether the observation was delivered.
  pub fn emit(&self, observation: PriceObservation) -> bool {
    if self.token.is_cancelled() {
      debug!(exchange = %observation.exchange, "Discarding observation from stopped strategy");
      return false;
    }
    if !observation.price.is_finite() || observation.price <= 0.0 {
      warn!(exchange = %observation.exchange, price = observation.price, "Discarding invalid price");
      return false;
    }
    self.target.observe(observation);
    true
  }

  /// Close the sink and signal the run-loop to exit.
  pub fn close(&self) {
    self.token.cancel();
  }

  /// Whether the sink has been closed.
  pub fn is_closed(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Cancellation token observed by the run-loop.
  pub fn token(&self) -> &CancellationToken {
    &self.token
  }

  pub(crate) fn gauge(&self) -> &Arc<StrategyGauge> {
    &self.gauge
  }
}

// ─── Run-loop bookkeeping ───

/// A launched run-loop.
struct RunLoop {
  pair: Pair,
  sink: ObservationSink,
  handle: JoinHandle<()>,
}

impl RunLoop {
  fn is_alive(&self) -> bool {
    !self.sink.is_closed() && !self.handle.is_finished()
  }

  /// Cancel and wait for the task to finish.
  async fn halt(self) {
    self.sink.close();
    if let Err(e) = self.handle.await {
      if e.is_panic() {
        warn!(pair = %self.pair, "Strategy run-loop panicked");
      }
    }
  }
}

// ─── Strategy ───

/// The active ingestion strategy of an orchestrator.
pub enum Strategy {
  Push(PushFeedStrategy),
  Poll(PollFeedStrategy),
}

impl Strategy {
  /// Which ingestion mechanism this strategy uses.
  pub const fn kind(&self) -> StrategyKind {
    match self {
      Self::Push(_) => StrategyKind::Push,
      Self::Poll(_) => StrategyKind::Poll,
    }
  }

  /// Exchange this strategy reads from.
  pub fn exchange(&self) -> &str {
    match self {
      Self::Push(s) => s.exchange(),
      Self::Poll(s) => s.exchange(),
    }
  }

  /// Pair of the current run-loop, if started.
  pub fn pair(&self) -> Option<&Pair> {
    self.run_loop().map(|r| &r.pair)
  }

  /// Whether the run-loop is alive and not cancelled.
  pub fn is_running(&self) -> bool {
    self.run_loop().is_some_and(RunLoop::is_alive)
  }

  /// Launch the run-loop for `pair` and return immediately.
  ///
  /// A strategy that is already started keeps its current run-loop.
  pub fn start(&mut self, pair: Pair, sink: ObservationSink) {
    if self.run_loop().is_some() {
      warn!(pair = %pair, "Strategy already started, ignoring start");
      return;
    }

    let handle = match self {
      Self::Push(s) => s.spawn(pair.clone(), sink.clone()),
      Self::Poll(s) => s.spawn(pair.clone(), sink.clone()),
    };
    *self.slot_mut() = Some(RunLoop { pair, sink, handle });
  }

  /// Request termination and wait until the run-loop has exited. Idempotent.
  pub async fn stop(&mut self) {
    if let Some(run) = self.slot_mut().take() {
      run.halt().await;
    }
  }

  fn slot_mut(&mut self) -> &mut Option<RunLoop> {
    match self {
      Self::Push(s) => &mut s.run,
      Self::Poll(s) => &mut s.run,
    }
  }

  fn run_loop(&self) -> Option<&RunLoop> {
    match self {
      Self::Push(s) => s.run.as_ref(),
      Self::Poll(s) => s.run.as_ref(),
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use parking_lot::Mutex;

  use super::*;

  /// Collects every observation it receives.
  #[derive(Default)]
  pub struct Collector {
    pub seen: Mutex<Vec<PriceObservation>>,
  }

  impl Collector {
    pub fn prices(&self) -> Vec<f64> {
      self.seen.lock().iter().map(|o| o.price).collect()
    }
  }

  impl ObservationTarget for Collector {
    fn observe(&self, observation: PriceObservation) {
      self.seen.lock().push(observation);
    }
  }

  pub fn sink_for(collector: &Arc<Collector>, gauge: &Arc<StrategyGauge>) -> ObservationSink {
    let target: Arc<dyn ObservationTarget> = collector.clone();
    ObservationSink::new(target, Arc::clone(gauge))
  }
}
