//! Arbitrage Scanner - Concurrent Cross-Venue Ticker Fan-out
//!
//! Asks every configured venue for its ticker at the same time. Each
//! request is bounded by `venue_timeout`; venues that fail or time out
//! are logged and left out of the snapshot.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, instrument, warn};

use crate::domain::market::Pair;
use crate::domain::message::ArbitrageSnapshot;
use crate::ports::exchange::ExchangeClient;

/// Default bound on a single venue request.
pub const DEFAULT_VENUE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ArbitrageScanner {
  venues: Vec<(String, Arc<dyn ExchangeClient>)>,
  venue_timeout: Duration,
}

impl ArbitrageScanner {
  pub fn new(venues: Vec<(String, Arc<dyn ExchangeClient>)>, venue_timeout: Duration) -> Self {
    Self { venues, venue_timeout }
  }

  /// Number of venues queried per scan.
  pub fn venue_count(&self) -> usize {
    self.venues.len()
  }

  /// Query every venue concurrently.
  ///
  /// Returns `None` when no venue answered.
  #[instrument(skip(self), fields(venues = self.venues.len()))]
  pub async fn scan(&self, pair: &Pair) -> Option<ArbitrageSnapshot> {
    let requests = self.venues.iter().map(|(name, client)| async move {
      match tokio::time::timeout(self.venue_timeout, client.fetch_ticker(pair)).await {
        Ok(Ok(price)) => Some((name.clone(), price)),
        Ok(Err(e)) => {
          warn!(venue = %name, error = %e, "Venue ticker failed");
          None
        }
        Err(_) => {
          warn!(venue = %name, timeout_ms = self.venue_timeout.as_millis(), "Venue ticker timed out");
          None
        }
      }
    });

    let prices: Vec<(String, f64)> = join_all(requests).await.into_iter().flatten().collect();
    debug!(answered = prices.len(), "Arbitrage scan complete");

    ArbitrageSnapshot::from_prices(pair.clone(), prices)
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;

  use super::*;
  use crate::domain::market::{Candle, Trade};

  struct Venue {
    price: Result<f64, &'static str>,
    delay: Duration,
  }

  #[async_trait]
  impl ExchangeClient for Venue {
    fn name(&self) -> &str {
      "venue"
    }

    async fn fetch_ticker(&self, _pair: &Pair) -> anyhow::Result<f64> {
      tokio::time::sleep(self.delay).await;
      self.price.map_err(|e| anyhow::anyhow!(e))
    }

    async fn fetch_trades(&self, _pair: &Pair, _limit: usize) -> anyhow::Result<Vec<Trade>> {
      Ok(vec![])
    }

    async fn fetch_candles(&self, _pair: &Pair, _timeframe: &str, _limit: usize) -> anyhow::Result<Vec<Candle>> {
      Ok(vec![])
    }
  }

  fn venue(name: &str, price: Result<f64, &'static str>, delay_ms: u64) -> (String, Arc<dyn ExchangeClient>) {
    (
      name.to_string(),
      Arc::new(Venue {
        price,
        delay: Duration::from_millis(delay_ms),
      }),
    )
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_venue_is_skipped() {
    let scanner = ArbitrageScanner::new(
      vec![venue("a", Ok(100.0), 10), venue("b", Err("down"), 10), venue("c", Ok(101.0), 10)],
      DEFAULT_VENUE_TIMEOUT,
    );

    let snapshot = scanner.scan(&"BTC/USDT".parse().unwrap()).await.unwrap();
    let names: Vec<_> = snapshot.quotes.iter().map(|q| q.exchange.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_requests_run_concurrently() {
    let scanner = ArbitrageScanner::new(
      vec![venue("a", Ok(1.0), 1000), venue("b", Ok(2.0), 1000), venue("c", Ok(3.0), 1000)],
      DEFAULT_VENUE_TIMEOUT,
    );

    let started = tokio::time::Instant::now();
    let snapshot = scanner.scan(&"BTC/USDT".parse().unwrap()).await.unwrap();
    assert_eq!(snapshot.quotes.len(), 3);
    assert!(started.elapsed() < Duration::from_millis(1500));
  }

  #[tokio::test(start_paused = true)]
  async fn test_nobody_answers() {
    let scanner = ArbitrageScanner::new(vec![venue("a", Err("down"), 0)], DEFAULT_VENUE_TIMEOUT);
    assert!(scanner.scan(&"BTC/USDT".parse().unwrap()).await.is_none());
  }
}
