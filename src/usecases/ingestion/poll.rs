//! Poll Strategy - Periodic Ticker Requests
//!
//! Used for venues without a push channel. Retries forever; only `stop`
//! ends the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::domain::market::{Pair, PriceObservation};
use crate::ports::exchange::ExchangeClient;

use super::{ObservationSink, RunLoop};

/// Timing knobs for the poll run-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
  /// Pause after a successful fetch.
  pub interval: Duration,
  /// Pause after a failed fetch.
  pub error_interval: Duration,
}

impl Default for PollSettings {
  fn default() -> Self {
    Self {
      interval: Duration::from_millis(1500),
      error_interval: Duration::from_secs(5),
    }
  }
}

/// Ingestion by polling an exchange's ticker endpoint.
pub struct PollFeedStrategy {
  exchange: String,
  client: Arc<dyn ExchangeClient>,
  settings: PollSettings,
  pub(super) run: Option<RunLoop>,
}

impl PollFeedStrategy {
  pub fn new(exchange: impl Into<String>, client: Arc<dyn ExchangeClient>, settings: PollSettings) -> Self {
    Self {
      exchange: exchange.into(),
      client,
      settings,
      run: None,
    }
  }

  pub fn exchange(&self) -> &str {
    &self.exchange
  }

  pub(super) fn spawn(&self, pair: Pair, sink: ObservationSink) -> JoinHandle<()> {
    let span = info_span!("poll_strategy", exchange = %self.exchange, pair = %pair);
    let exchange = self.exchange.clone();
    let client = Arc::clone(&self.client);
    let settings = self.settings;

    tokio::spawn(run(exchange, client, pair, sink, settings).instrument(span))
  }
}

async fn run(
  exchange: String,
  client: Arc<dyn ExchangeClient>,
  pair: Pair,
  sink: ObservationSink,
  settings: PollSettings,
) {
  let _live = sink.gauge().enter();
  let token = sink.token().clone();
  info!("Poll strategy started");

  loop {
    let fetched = tokio::select! {
      () = token.cancelled() => break,
      res = client.fetch_ticker(&pair) => res,
    };

    let pause = match fetched {
      Ok(price) => {
        debug!(price, "Polled ticker");
        sink.emit(PriceObservation::now(exchange.as_str(), pair.clone(), price));
        settings.interval
      }
      Err(e) => {
        warn!(error = %e, retry_ms = settings.error_interval.as_millis(), "Ticker poll failed");
        settings.error_interval
      }
    };

    tokio::select! {
      () = token.cancelled() => break,
      () = tokio::time::sleep(pause) => {}
    }
  }

  info!("Poll strategy stopped");
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;

  use super::super::testing::{Collector, sink_for};
  use super::super::{Strategy, StrategyGauge};
  use super::*;
  use crate::domain::market::{Candle, Trade};

  /// Fails every call whose index is listed in `fail_on`.
  struct FlakyTicker {
    calls: AtomicUsize,
    fail_on: Vec<usize>,
  }

  #[async_trait]
  impl ExchangeClient for FlakyTicker {
    fn name(&self) -> &str {
      "flaky"
    }

    async fn fetch_ticker(&self, _pair: &Pair) -> anyhow::Result<f64> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      if self.fail_on.contains(&n) {
        anyhow::bail!("upstream 503");
      }
      Ok(100.0 + n as f64)
    }

    async fn fetch_trades(&self, _pair: &Pair, _limit: usize) -> anyhow::Result<Vec<Trade>> {
      Ok(vec![])
    }

    async fn fetch_candles(&self, _pair: &Pair, _timeframe: &str, _limit: usize) -> anyhow::Result<Vec<Candle>> {
      Ok(vec![])
    }
  }

  fn pair() -> Pair {
    "ETH/USDT".parse().unwrap()
  }

  #[tokio::test(start_paused = true)]
  async fn test_polls_at_interval() {
    let client = Arc::new(FlakyTicker {
      calls: AtomicUsize::new(0),
      fail_on: vec![],
    });
    let collector = Arc::new(Collector::default());
    let gauge = Arc::new(StrategyGauge::new());

    let mut strategy = Strategy::Poll(PollFeedStrategy::new("kraken", client.clone(), PollSettings::default()));
    strategy.start(pair(), sink_for(&collector, &gauge));

    // t = 0, 1.5, 3.0
    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(collector.prices(), vec![100.0, 101.0, 102.0]);

    strategy.stop().await;
    let calls = client.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.calls.load(Ordering::SeqCst), calls);
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_waits_longer_and_keeps_going() {
    let client = Arc::new(FlakyTicker {
      calls: AtomicUsize::new(0),
      fail_on: vec![0],
    });
    let collector = Arc::new(Collector::default());
    let gauge = Arc::new(StrategyGauge::new());

    let mut strategy = Strategy::Poll(PollFeedStrategy::new("kraken", client.clone(), PollSettings::default()));
    strategy.start(pair(), sink_for(&collector, &gauge));

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert!(collector.prices().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(collector.prices(), vec![101.0]);
    assert!(strategy.is_running());

    strategy.stop().await;
    assert_eq!(gauge.current(), 0);
  }
}
