//! Core market data types.
//!
//! Defines the values that flow through the distribution engine:
//! validated trading pairs, price observations produced by ingestion
//! strategies, and the trade/candle records fetched by the poller.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StreamError;

// ────────────────────────────────────────────
// Trading pair
// ────────────────────────────────────────────

/// A validated `BASE/QUOTE` trading pair (e.g. `BTC/USDT`).
///
/// Both legs are uppercase ASCII alphanumerics. Venue-specific symbol
/// renderings are derived from this canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    /// Build a pair from its two legs, normalising to uppercase.
    pub fn new(base: &str, quote: &str) -> Result<Self, StreamError> {
        let base = base.trim().to_ascii_uppercase();
        let quote = quote.trim().to_ascii_uppercase();

        let valid = |leg: &str| !leg.is_empty() && leg.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(&base) || !valid(&quote) {
            return Err(StreamError::InvalidPair(format!("{base}/{quote}")));
        }

        Ok(Self { base, quote })
    }

    /// Base asset (e.g. `BTC`).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote asset (e.g. `USDT`).
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Concatenated venue symbol (`BTCUSDT`).
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Lowercase stream symbol (`btcusdt`), as used by push channels.
    pub fn stream_symbol(&self) -> String {
        self.symbol().to_ascii_lowercase()
    }
}

impl Default for Pair {
    /// `BTC/USDT`, the pair streamed when nothing else is configured.
    fn default() -> Self {
        Self {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
        }
    }
}

impl FromStr for Pair {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut legs = s.split('/');
        match (legs.next(), legs.next(), legs.next()) {
            (Some(base), Some(quote), None) => Self::new(base, quote),
            _ => Err(StreamError::InvalidPair(s.to_string())),
        }
    }
}

impl TryFrom<String> for Pair {
    type Error = StreamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

// ────────────────────────────────────────────
// Observations
// ────────────────────────────────────────────

/// A single price observation produced by an ingestion strategy.
///
/// Immutable value; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    /// Exchange the price came from.
    pub exchange: String,
    /// Pair the price refers to.
    pub pair: Pair,
    /// Last traded / ticker price.
    pub price: f64,
    /// When the strategy observed the price.
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    /// Create an observation stamped with the current time.
    pub fn now(exchange: impl Into<String>, pair: Pair, price: f64) -> Self {
        Self {
            exchange: exchange.into(),
            pair,
            price,
            observed_at: Utc::now(),
        }
    }
}

// ────────────────────────────────────────────
// Trades and candles
// ────────────────────────────────────────────

/// Aggressor side of a public trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A public trade as reported by a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Venue trade identifier.
    pub id: String,
    /// Execution price.
    pub price: f64,
    /// Executed base quantity.
    pub amount: f64,
    /// Aggressor side.
    pub side: TradeSide,
    /// Execution time (Unix ms).
    pub time: u64,
}

/// One OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time (Unix ms).
    pub t: u64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}
