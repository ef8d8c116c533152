//! Exchange Adapters - REST Market Data
//!
//! - `client`: rate-limited JSON-over-HTTP client with retries
//! - `rest`: Binance-compatible `ExchangeClient`

pub mod client;
pub mod rest;

pub use client::{HttpClient, HttpClientConfig};
pub use rest::RestExchangeClient;
