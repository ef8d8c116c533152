//! Exchange Port - Imperative Market Data Queries
//!
//! Defines the trait for venues that are queried over request/response
//! (REST). Used by the poll ingestion strategy, the resilient poller and
//! the cross-venue arbitrage scan. Wire formats live in adapters.

use async_trait::async_trait;

use crate::domain::market::{Candle, Pair, Trade};

/// Request/response access to one exchange.
///
/// Implementations must be cheap to share (`Arc<dyn ExchangeClient>`) and
/// safe to call concurrently; the poller and a poll strategy may hit the
/// same venue at the same time.
#[async_trait]
pub trait ExchangeClient: Send + Sync + 'static {
  /// Exchange identifier as used in configuration (e.g. `binance`).
  fn name(&self) -> &str;

  /// Last traded price for a pair.
  async fn fetch_ticker(&self, pair: &Pair) -> anyhow::Result<f64>;

  /// Most recent public trades, newest last, at most `limit` entries.
  async fn fetch_trades(&self, pair: &Pair, limit: usize) -> anyhow::Result<Vec<Trade>>;

  /// Most recent candles for `timeframe` (e.g. `1m`), oldest first.
  async fn fetch_candles(
    &self,
    pair: &Pair,
    timeframe: &str,
    limit: usize,
  ) -> anyhow::Result<Vec<Candle>>;
}
