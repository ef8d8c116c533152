//! Market Data Feed Adapters - Real-time Price Streaming
//!
//! Provides WebSocket-based push feeds:
//! - Binance: `<symbol>@trade` stream

pub mod binance;

pub use binance::BinancePushFeed;
