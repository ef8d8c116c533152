//! Binance WebSocket Feed - Push Trade Stream
//!
//! Opens one `<ws_url>/<symbol>@trade` session per `connect` call and
//! exposes its trades as a [`TickStream`]. Reconnection is owned by the
//! push strategy; this adapter only reports errors and end-of-stream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, instrument};

use crate::domain::market::Pair;
use crate::ports::push_feed::{PushFeed, PushTick, TickStream};

/// Default Binance spot stream endpoint.
pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Binance WebSocket trade message.
#[derive(Debug, Deserialize)]
struct TradeMsg {
    /// Price as string.
    p: String,
    /// Quantity as string.
    q: String,
    /// Trade time (Unix ms).
    #[serde(rename = "T")]
    trade_time: u64,
}

/// Binance real-time trade feed via WebSocket.
#[derive(Debug, Clone)]
pub struct BinancePushFeed {
    /// Stream base URL (without the `/<symbol>@trade` suffix).
    ws_url: String,
}

impl BinancePushFeed {
    /// Create a feed for the given stream base URL.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    /// Full stream URL for a pair.
    pub fn stream_url(&self, pair: &Pair) -> String {
        format!(
            "{}/{}@trade",
            self.ws_url.trim_end_matches('/'),
            pair.stream_symbol()
        )
    }
}

impl Default for BinancePushFeed {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL)
    }
}

#[async_trait]
impl PushFeed for BinancePushFeed {
    #[instrument(skip(self), fields(pair = %pair))]
    async fn connect(&self, pair: &Pair) -> Result<TickStream> {
        let url = self.stream_url(pair);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Binance WebSocket connection to {url} failed"))?;

        info!(url = %url, "Binance WebSocket connected");

        let ticks = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(WsMessage::Text(text)) => match parse_trade(&text) {
                    Ok(tick) => Some(Ok(tick)),
                    Err(e) => {
                        debug!(error = %e, "Failed to parse Binance message");
                        None
                    }
                },
                Ok(WsMessage::Close(frame)) => {
                    Some(Err(anyhow::anyhow!("WebSocket closed by server: {frame:?}")))
                }
                // Pong is handled automatically by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(anyhow::anyhow!("WebSocket error: {e}"))),
            }
        });

        Ok(ticks.boxed())
    }
}

/// Parse a single trade message.
fn parse_trade(text: &str) -> Result<PushTick> {
    let msg: TradeMsg = serde_json::from_str(text).context("Invalid trade JSON")?;

    Ok(PushTick {
        price: msg.p.parse().context("Invalid price")?,
        quantity: msg.q.parse().context("Invalid quantity")?,
        timestamp_ms: msg.trade_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        let feed = BinancePushFeed::new("wss://stream.binance.com:9443/ws/");
        let pair: Pair = "ETH/USDT".parse().unwrap();
        assert_eq!(
            feed.stream_url(&pair),
            "wss://stream.binance.com:9443/ws/ethusdt@trade"
        );
    }

    #[test]
    fn test_parse_trade() {
        let tick = parse_trade(
            r#"{"e":"trade","E":1672515782136,"s":"BTCUSDT","t":12345,"p":"16500.10","q":"0.002","T":1672515782134,"m":true,"M":true}"#,
        )
        .unwrap();
        assert!((tick.price - 16_500.1).abs() < 1e-9);
        assert!((tick.quantity - 0.002).abs() < 1e-12);
        assert_eq!(tick.timestamp_ms, 1_672_515_782_134);
    }

    #[test]
    fn test_parse_trade_rejects_other_events() {
        assert!(parse_trade(r#"{"result":null,"id":1}"#).is_err());
        assert!(parse_trade(r#"{"p":"x","q":"1","T":1}"#).is_err());
    }
}
