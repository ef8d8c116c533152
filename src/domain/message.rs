//! Outbound message envelope.
//!
//! Every message fanned out to subscribers or connections is one variant
//! of [`Message`]. The serialized form is transport-agnostic:
//! `{"type": "TICKER", "data": {...}}`.

use serde::{Deserialize, Serialize};

use super::market::{Pair, Trade};

/// Tagged union of everything the engine publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Live price from the active strategy.
    Ticker(TickerPayload),
    /// Indicator-vote sentiment for the current pair.
    Sentiment(SentimentPayload),
    /// Most recent public trades for the current pair.
    Trades(TradesPayload),
    /// Cross-venue price comparison.
    Arbitrage(ArbitrageSnapshot),
}

impl Message {
    /// Wire type tag of this message.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ticker(_) => "TICKER",
            Self::Sentiment(_) => "SENTIMENT",
            Self::Trades(_) => "TRADES",
            Self::Arbitrage(_) => "ARBITRAGE",
        }
    }
}

/// Payload of a [`Message::Ticker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerPayload {
    pub exchange: String,
    pub pair: Pair,
    pub price: f64,
    /// Monotonic publish timestamp (Unix ms, never decreases).
    pub timestamp: u64,
}

/// Individual indicator vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

/// One line of the sentiment breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorVote {
    /// Indicator name (e.g. `RSI (14)`).
    pub name: String,
    pub signal: Signal,
}

/// Vote counts behind a verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSummary {
    pub buy: u32,
    pub sell: u32,
    pub neutral: u32,
}

/// Result of the external sentiment computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Human-readable verdict (`STRONG BUY`, `NEUTRAL`, ...).
    pub verdict: String,
    /// Buy votes minus sell votes.
    pub score: i32,
    #[serde(default)]
    pub summary: VoteSummary,
    #[serde(default)]
    pub details: Vec<IndicatorVote>,
}

/// Payload of a [`Message::Sentiment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentPayload {
    pub exchange: String,
    pub pair: Pair,
    #[serde(flatten)]
    pub analysis: AnalysisResult,
}

/// Payload of a [`Message::Trades`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradesPayload {
    pub exchange: String,
    pub pair: Pair,
    pub trades: Vec<Trade>,
}

/// A single venue's price in an arbitrage comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueQuote {
    pub exchange: String,
    pub price: f64,
    /// Premium over the cheapest responding venue, in percent.
    pub premium_pct: f64,
}

/// Cross-venue comparison for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageSnapshot {
    pub pair: Pair,
    /// Responding venues, cheapest first.
    pub quotes: Vec<VenueQuote>,
    /// Venue with the lowest price.
    pub best_exchange: String,
    /// Spread between the most and least expensive venue, in percent.
    pub spread_pct: f64,
}

impl ArbitrageSnapshot {
    /// Build a snapshot from raw `(venue, price)` answers.
    ///
    /// Returns `None` when no venue answered.
    pub fn from_prices(pair: Pair, prices: Vec<(String, f64)>) -> Option<Self> {
        let mut prices: Vec<_> = prices
            .into_iter()
            .filter(|(_, price)| price.is_finite() && *price > 0.0)
            .collect();
        prices.sort_by(|a, b| a.1.total_cmp(&b.1));

        let (best_exchange, min) = prices.first().cloned()?;
        let max = prices.last().map_or(min, |(_, p)| *p);

        let quotes = prices
            .into_iter()
            .map(|(exchange, price)| VenueQuote {
                exchange,
                price,
                premium_pct: (price - min) / min * 100.0,
            })
            .collect();

        Some(Self {
            pair,
            quotes,
            best_exchange,
            spread_pct: (max - min) / min * 100.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::TradeSide;

    fn pair() -> Pair {
        "BTC/USDT".parse().unwrap()
    }

    #[test]
    fn test_ticker_wire_shape() {
        let msg = Message::Ticker(TickerPayload {
            exchange: "binance".to_string(),
            pair: pair(),
            price: 98150.2,
            timestamp: 1_700_000_000_000,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "TICKER");
        assert_eq!(value["data"]["exchange"], "binance");
        assert_eq!(value["data"]["pair"], "BTC/USDT");
        assert_eq!(value["data"]["timestamp"], 1_700_000_000_000u64);
        assert_eq!(msg.kind(), "TICKER");
    }

    #[test]
    fn test_sentiment_flattens_analysis() {
        let msg = Message::Sentiment(SentimentPayload {
            exchange: "binance".to_string(),
            pair: pair(),
            analysis: AnalysisResult {
                verdict: "BUY".to_string(),
                score: 3,
                summary: VoteSummary { buy: 8, sell: 5, neutral: 7 },
                details: vec![IndicatorVote { name: "RSI (14)".to_string(), signal: Signal::Neutral }],
            },
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "SENTIMENT");
        assert_eq!(value["data"]["verdict"], "BUY");
        assert_eq!(value["data"]["summary"]["sell"], 5);
        assert_eq!(value["data"]["details"][0]["signal"], "NEUTRAL");
    }

    #[test]
    fn test_trades_wire_shape() {
        let msg = Message::Trades(TradesPayload {
            exchange: "binance".to_string(),
            pair: pair(),
            trades: vec![Trade {
                id: "42".to_string(),
                price: 1.5,
                amount: 2.0,
                side: TradeSide::Sell,
                time: 7,
            }],
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "TRADES");
        assert_eq!(value["data"]["trades"][0]["side"], "sell");
    }

    #[test]
    fn test_arbitrage_snapshot_orders_and_computes_premium() {
        let snapshot = ArbitrageSnapshot::from_prices(
            pair(),
            vec![
                ("kucoin".to_string(), 101.0),
                ("binance".to_string(), 100.0),
                ("bybit".to_string(), 102.0),
            ],
        )
        .unwrap();

        assert_eq!(snapshot.best_exchange, "binance");
        assert_eq!(snapshot.quotes.len(), 3);
        assert_eq!(snapshot.quotes[0].exchange, "binance");
        assert!(snapshot.quotes[0].premium_pct.abs() < 1e-9);
        assert!((snapshot.quotes[1].premium_pct - 1.0).abs() < 1e-9);
        assert!((snapshot.spread_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_arbitrage_snapshot_empty_is_none() {
        assert!(ArbitrageSnapshot::from_prices(pair(), vec![]).is_none());
        assert!(ArbitrageSnapshot::from_prices(pair(), vec![("x".to_string(), 0.0)]).is_none());
    }
}
