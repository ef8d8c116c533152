//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `ExchangeClient`: Request/response market data (ticker, trades, candles)
//! - `PushFeed`: Streaming trade ticks
//! - `SentimentAnalyzer`: External indicator analytics
//! - `Connection`: Transport-owned egress handles

pub mod analytics;
pub mod connection;
pub mod exchange;
pub mod push_feed;

pub use analytics::SentimentAnalyzer;
pub use connection::{Connection, ConnectionId};
pub use exchange::ExchangeClient;
pub use push_feed::{PushFeed, PushTick, TickStream};
