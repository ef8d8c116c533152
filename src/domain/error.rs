//! Caller-facing error types.
//!
//! Only configuration-style failures are surfaced to callers. Upstream
//! errors inside background tasks never reach this type; they are logged
//! and turned into retry decisions where they happen.

use thiserror::Error;

/// Rejections returned synchronously by the engine's public operations.
///
/// A rejected call never disturbs the strategy that is currently running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The requested exchange is not configured.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// The requested pair is not a valid `BASE/QUOTE` symbol.
    #[error("invalid pair: {0:?}")]
    InvalidPair(String),

    /// `start_engine` was called while a strategy is already running.
    #[error("engine already running on {exchange} {pair}")]
    AlreadyRunning { exchange: String, pair: String },

    /// The registry has reached its configured subscriber limit.
    #[error("subscriber limit reached ({0})")]
    SubscriberLimit(usize),
}

/// Failure to deliver a message to a single transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The peer side of the connection has gone away.
    #[error("connection closed")]
    Closed,

    /// Transport-specific failure.
    #[error("transport error: {0}")]
    Transport(String),
}
