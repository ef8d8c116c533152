//! Domain layer - Core market data types and policies.
//!
//! Pure types with no I/O (hexagonal architecture inner ring).
//! Everything here is serializable and testable in isolation.

pub mod backoff;
pub mod error;
pub mod market;
pub mod message;

// Re-export core types for convenience
pub use backoff::ErrorBackoff;
pub use error::{SendError, StreamError};
pub use market::{Candle, Pair, PriceObservation, Trade, TradeSide};
pub use message::{
    AnalysisResult, ArbitrageSnapshot, IndicatorVote, Message, SentimentPayload, Signal,
    TickerPayload, TradesPayload, VenueQuote, VoteSummary,
};
