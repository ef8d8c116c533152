//! REST Exchange Client - Binance-compatible Market Data
//!
//! Implements [`ExchangeClient`] against the Binance spot REST layout
//! (`/api/v3/ticker/price`, `/api/v3/trades`, `/api/v3/klines`). Every
//! configured venue gets its own instance with its own base URL and
//! rate limit.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::market::{Candle, Pair, Trade, TradeSide};
use crate::ports::exchange::ExchangeClient;

use super::client::{HttpClient, HttpClientConfig};

/// `/api/v3/ticker/price` answer.
#[derive(Debug, Deserialize)]
struct TickerPrice {
  price: String,
}

/// One element of the `/api/v3/trades` answer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrade {
  id: u64,
  price: String,
  qty: String,
  time: u64,
  /// Buyer was the maker, so the aggressor sold.
  is_buyer_maker: bool,
}

/// Binance-compatible REST market data client.
pub struct RestExchangeClient {
  name: String,
  http: HttpClient,
}

impl RestExchangeClient {
  /// Create a client for venue `name`.
  pub fn new(name: impl Into<String>, config: HttpClientConfig) -> Result<Self> {
    Ok(Self {
      name: name.into(),
      http: HttpClient::new(config)?,
    })
  }
}

#[async_trait]
impl ExchangeClient for RestExchangeClient {
  fn name(&self) -> &str {
    &self.name
  }

  #[instrument(skip(self), fields(venue = %self.name))]
  async fn fetch_ticker(&self, pair: &Pair) -> Result<f64> {
    let ticker: TickerPrice = self
      .http
      .get_json("/api/v3/ticker/price", &[("symbol", pair.symbol())])
      .await?;
    parse_price(&ticker.price)
  }

  #[instrument(skip(self), fields(venue = %self.name))]
  async fn fetch_trades(&self, pair: &Pair, limit: usize) -> Result<Vec<Trade>> {
    let raw: Vec<RawTrade> = self
      .http
      .get_json(
        "/api/v3/trades",
        &[("symbol", pair.symbol()), ("limit", limit.to_string())],
      )
      .await?;
    debug!(count = raw.len(), "Fetched trades");
    raw.into_iter().map(convert_trade).collect()
  }

  #[instrument(skip(self), fields(venue = %self.name))]
  async fn fetch_candles(
    &self,
    pair: &Pair,
    timeframe: &str,
    limit: usize,
  ) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = self
      .http
      .get_json(
        "/api/v3/klines",
        &[
          ("symbol", pair.symbol()),
          ("interval", timeframe.to_string()),
          ("limit", limit.to_string()),
        ],
      )
      .await?;
    rows.iter().map(|row| parse_kline(row)).collect()
  }
}

fn parse_price(raw: &str) -> Result<f64> {
  let price: f64 = raw.parse().with_context(|| format!("Invalid price {raw:?}"))?;
  anyhow::ensure!(price.is_finite() && price > 0.0, "Non-positive price {raw:?}");
  Ok(price)
}

fn convert_trade(raw: RawTrade) -> Result<Trade> {
  Ok(Trade {
    id: raw.id.to_string(),
    price: parse_price(&raw.price)?,
    amount: raw.qty.parse().context("Invalid trade quantity")?,
    side: if raw.is_buyer_maker { TradeSide::Sell } else { TradeSide::Buy },
    time: raw.time,
  })
}

/// `[open_time, open, high, low, close, volume, ...]`, numbers as strings.
fn parse_kline(row: &[Value]) -> Result<Candle> {
  anyhow::ensure!(row.len() >= 6, "Kline row too short ({} fields)", row.len());

  let t = row[0].as_u64().context("Invalid kline open time")?;
  let field = |i: usize| -> Result<f64> {
    match &row[i] {
      Value::String(s) => s.parse().with_context(|| format!("Invalid kline field {i}")),
      Value::Number(n) => n.as_f64().with_context(|| format!("Invalid kline field {i}")),
      _ => anyhow::bail!("Invalid kline field {i}"),
    }
  };

  Ok(Candle {
    t,
    o: field(1)?,
    h: field(2)?,
    l: field(3)?,
    c: field(4)?,
    v: field(5)?,
  })
}
