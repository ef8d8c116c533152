//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Every tunable
//! has a serde default, so a file only needs the venues it streams from.
//! Venue endpoints are externalized here - nothing is hardcoded in the
//! use-case layer.

pub mod hot_reload;
pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::market::Pair;
use crate::usecases::ingestion::{PollSettings, PushSettings};
use crate::usecases::orchestrator::StreamSettings;
use crate::usecases::poller::PollerSettings;

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
  /// Service identity and logging.
  #[serde(default)]
  pub service: ServiceConfig,
  /// Ingestion defaults and fan-out limits.
  #[serde(default)]
  pub stream: StreamConfig,
  /// Periodic analytics cycle.
  #[serde(default)]
  pub poller: PollerConfig,
  /// Connection broadcast.
  #[serde(default)]
  pub connections: ConnectionsConfig,
  /// Exchanges the engine can stream from.
  pub venues: Vec<VenueConfig>,
  /// External sentiment service.
  #[serde(default)]
  pub analytics: AnalyticsConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  #[serde(default = "default_service_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Ingestion configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StreamConfig {
  /// Exchange streamed at startup; must have a `ws_url`.
  #[serde(default = "default_push_exchange")]
  pub push_exchange: String,
  /// Pair streamed at startup (`BASE/QUOTE`).
  #[serde(default = "default_pair")]
  pub default_pair: String,
  /// Per-subscriber queue depth.
  #[serde(default = "default_subscriber_capacity")]
  pub subscriber_capacity: usize,
  /// Subscriber ceiling (0 = unlimited).
  #[serde(default)]
  pub max_subscribers: usize,
  /// Push receive timeout before re-checking cancellation.
  #[serde(default = "default_recv_timeout")]
  pub recv_timeout_ms: u64,
  /// Pause after a failed push connect.
  #[serde(default = "default_connect_retry")]
  pub connect_retry_ms: u64,
  /// Poll strategy interval after success.
  #[serde(default = "default_poll_interval")]
  pub poll_interval_ms: u64,
  /// Poll strategy interval after an error.
  #[serde(default = "default_poll_error_interval")]
  pub poll_error_interval_ms: u64,
}

/// Resilient poller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollerConfig {
  #[serde(default = "default_idle_interval")]
  pub idle_interval_ms: u64,
  #[serde(default = "default_cycle_interval")]
  pub cycle_interval_ms: u64,
  #[serde(default = "default_backoff_base")]
  pub backoff_base_ms: u64,
  #[serde(default = "default_backoff_cap")]
  pub backoff_cap_ms: u64,
  /// Arbitrage scan every N completed cycles.
  #[serde(default = "default_arbitrage_every")]
  pub arbitrage_every: u32,
  /// Per-venue bound during the arbitrage scan.
  #[serde(default = "default_venue_timeout")]
  pub venue_timeout_ms: u64,
  #[serde(default = "default_candle_timeframe")]
  pub candle_timeframe: String,
  #[serde(default = "default_candle_limit")]
  pub candle_limit: usize,
  #[serde(default = "default_trade_limit")]
  pub trade_limit: usize,
}

/// Connection broadcast configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionsConfig {
  /// Upper bound on a single connection send.
  #[serde(default = "default_send_timeout")]
  pub send_timeout_ms: u64,
}

/// One exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VenueConfig {
  /// Exchange id used in `change_stream` requests.
  pub name: String,
  /// REST base URL (Binance-compatible layout).
  pub rest_url: String,
  /// Push stream base URL; venues without one are polled.
  #[serde(default)]
  pub ws_url: Option<String>,
  /// REST request-rate ceiling (0 = unlimited).
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
}

/// Sentiment service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnalyticsConfig {
  /// Base URL of the analytics service.
  #[serde(default = "default_analytics_url")]
  pub url: String,
  /// Request timeout.
  #[serde(default = "default_analytics_timeout")]
  pub timeout_ms: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl AppConfig {
  /// Look up a venue by name (case-insensitive).
  pub fn venue(&self, name: &str) -> Option<&VenueConfig> {
    self.venues.iter().find(|v| v.name.eq_ignore_ascii_case(name))
  }

  /// Orchestrator settings. Fails when `default_pair` is malformed.
  pub fn stream_settings(&self) -> anyhow::Result<StreamSettings> {
    let default_pair: Pair = self.stream.default_pair.parse()?;
    Ok(StreamSettings {
      push_exchange: self.stream.push_exchange.to_ascii_lowercase(),
      default_pair,
      push: PushSettings {
        recv_timeout: ms(self.stream.recv_timeout_ms),
        connect_retry: ms(self.stream.connect_retry_ms),
      },
      poll: PollSettings {
        interval: ms(self.stream.poll_interval_ms),
        error_interval: ms(self.stream.poll_error_interval_ms),
      },
    })
  }

  /// Poller settings.
  pub fn poller_settings(&self) -> PollerSettings {
    PollerSettings {
      idle_interval: ms(self.poller.idle_interval_ms),
      cycle_interval: ms(self.poller.cycle_interval_ms),
      backoff_base: ms(self.poller.backoff_base_ms),
      backoff_cap: ms(self.poller.backoff_cap_ms),
      arbitrage_every: self.poller.arbitrage_every,
      candle_timeframe: self.poller.candle_timeframe.clone(),
      candle_limit: self.poller.candle_limit,
      trade_limit: self.poller.trade_limit,
    }
  }
}

const fn ms(millis: u64) -> Duration {
  Duration::from_millis(millis)
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_service_name(),
      log_level: default_log_level(),
    }
  }
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self {
      push_exchange: default_push_exchange(),
      default_pair: default_pair(),
      subscriber_capacity: default_subscriber_capacity(),
      max_subscribers: 0,
      recv_timeout_ms: default_recv_timeout(),
      connect_retry_ms: default_connect_retry(),
      poll_interval_ms: default_poll_interval(),
      poll_error_interval_ms: default_poll_error_interval(),
    }
  }
}

impl Default for PollerConfig {
  fn default() -> Self {
    Self {
      idle_interval_ms: default_idle_interval(),
      cycle_interval_ms: default_cycle_interval(),
      backoff_base_ms: default_backoff_base(),
      backoff_cap_ms: default_backoff_cap(),
      arbitrage_every: default_arbitrage_every(),
      venue_timeout_ms: default_venue_timeout(),
      candle_timeframe: default_candle_timeframe(),
      candle_limit: default_candle_limit(),
      trade_limit: default_trade_limit(),
    }
  }
}

impl Default for ConnectionsConfig {
  fn default() -> Self {
    Self {
      send_timeout_ms: default_send_timeout(),
    }
  }
}

impl Default for AnalyticsConfig {
  fn default() -> Self {
    Self {
      url: default_analytics_url(),
      timeout_ms: default_analytics_timeout(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_service_name() -> String {
  "metron-stream".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_push_exchange() -> String {
  "binance".to_string()
}

fn default_pair() -> String {
  "BTC/USDT".to_string()
}

fn default_subscriber_capacity() -> usize {
  100
}

fn default_recv_timeout() -> u64 {
  5_000
}

fn default_connect_retry() -> u64 {
  1_000
}

fn default_poll_interval() -> u64 {
  1_500
}

fn default_poll_error_interval() -> u64 {
  5_000
}

fn default_idle_interval() -> u64 {
  3_000
}

fn default_cycle_interval() -> u64 {
  2_000
}

fn default_backoff_base() -> u64 {
  2_000
}

fn default_backoff_cap() -> u64 {
  30_000
}

fn default_arbitrage_every() -> u32 {
  5
}

fn default_venue_timeout() -> u64 {
  5_000
}

fn default_candle_timeframe() -> String {
  "1m".to_string()
}

fn default_candle_limit() -> usize {
  100
}

fn default_trade_limit() -> usize {
  50
}

fn default_send_timeout() -> u64 {
  2_000
}

fn default_requests_per_second() -> u32 {
  10
}

fn default_analytics_url() -> String {
  "http://127.0.0.1:8000".to_string()
}

fn default_analytics_timeout() -> u64 {
  10_000
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
