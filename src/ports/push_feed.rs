//! Push Feed Port - Streaming Market Data Interface
//!
//! Defines the trait for venues that deliver a continuous message stream
//! (WebSocket trade channels). One call to `connect` opens one session;
//! the returned stream ends or yields an error when the session is lost.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::market::Pair;

/// One inbound trade tick from a push channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushTick {
  /// Trade price.
  pub price: f64,
  /// Trade quantity.
  pub quantity: f64,
  /// Venue timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// Stream of ticks for a single session.
pub type TickStream = BoxStream<'static, anyhow::Result<PushTick>>;

/// Trait for push-capable market data providers.
///
/// The ingestion layer never sees socket details; it only observes ticks,
/// errors and end-of-stream, and reconnects by calling `connect` again.
#[async_trait]
pub trait PushFeed: Send + Sync + 'static {
  /// Open a new session for `pair`.
  async fn connect(&self, pair: &Pair) -> anyhow::Result<TickStream>;
}
