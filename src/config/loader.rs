//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::domain::market::Pair;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    venues = config.venues.len(),
    push_exchange = %config.stream.push_exchange,
    pair = %config.stream.default_pair,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty, uniquely named venue definitions
/// - A push exchange that exists and has a stream URL
/// - A well-formed default pair
/// - Positive intervals and limits
fn validate_config(config: &AppConfig) -> Result<()> {
  // Venue validation
  anyhow::ensure!(!config.venues.is_empty(), "At least one venue must be configured");

  let mut seen = HashSet::new();
  for (i, venue) in config.venues.iter().enumerate() {
    anyhow::ensure!(!venue.name.trim().is_empty(), "Venue {i} has an empty name");
    anyhow::ensure!(
      seen.insert(venue.name.to_ascii_lowercase()),
      "Venue {} is configured twice",
      venue.name
    );
    anyhow::ensure!(!venue.rest_url.is_empty(), "Venue {} has an empty rest_url", venue.name);
  }

  // Stream validation
  let push = config.venue(&config.stream.push_exchange).with_context(|| {
    format!(
      "push_exchange {} is not a configured venue",
      config.stream.push_exchange
    )
  })?;
  anyhow::ensure!(
    push.ws_url.as_deref().is_some_and(|url| !url.is_empty()),
    "push_exchange {} has no ws_url",
    push.name
  );
  config
    .stream
    .default_pair
    .parse::<Pair>()
    .with_context(|| format!("default_pair {:?} is not BASE/QUOTE", config.stream.default_pair))?;
  anyhow::ensure!(
    config.stream.subscriber_capacity > 0,
    "subscriber_capacity must be positive"
  );
  anyhow::ensure!(
    config.stream.recv_timeout_ms > 0
      && config.stream.poll_interval_ms > 0
      && config.stream.poll_error_interval_ms > 0,
    "stream intervals must be positive"
  );

  // Poller validation
  anyhow::ensure!(
    config.poller.arbitrage_every >= 1,
    "arbitrage_every must be at least 1, got {}",
    config.poller.arbitrage_every
  );
  anyhow::ensure!(
    config.poller.idle_interval_ms > 0
      && config.poller.cycle_interval_ms > 0
      && config.poller.backoff_base_ms > 0
      && config.poller.venue_timeout_ms > 0,
    "poller intervals must be positive"
  );
  anyhow::ensure!(
    config.poller.backoff_cap_ms >= config.poller.backoff_base_ms,
    "backoff_cap_ms must be at least backoff_base_ms"
  );

  // Connections validation
  anyhow::ensure!(
    config.connections.send_timeout_ms > 0,
    "send_timeout_ms must be positive"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"
[[venues]]
name = "binance"
rest_url = "https://api.binance.com"
ws_url = "wss://stream.binance.com:9443/ws"

[[venues]]
name = "kraken"
rest_url = "https://kraken.example.com"
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.stream.push_exchange, "binance");
    assert_eq!(config.stream.default_pair, "BTC/USDT");
    assert_eq!(config.stream.subscriber_capacity, 100);
    assert_eq!(config.poller.arbitrage_every, 5);
    assert_eq!(config.venues[1].ws_url, None);

    let poller = config.poller_settings();
    assert_eq!(poller.backoff_cap.as_secs(), 30);
    let stream = config.stream_settings().unwrap();
    assert_eq!(stream.poll.interval.as_millis(), 1500);
  }

  #[test]
  fn test_push_exchange_needs_ws_url() {
    let toml = format!("[stream]\npush_exchange = \"kraken\"\n{MINIMAL}");
    let err = parse_config(&toml).unwrap_err();
    assert!(err.to_string().contains("no ws_url"));
  }

  #[test]
  fn test_rejects_bad_pair_and_duplicates() {
    let toml = format!("[stream]\ndefault_pair = \"BTCUSDT\"\n{MINIMAL}");
    assert!(parse_config(&toml).is_err());

    let toml = format!("{MINIMAL}\n[[venues]]\nname = \"Binance\"\nrest_url = \"x\"\n");
    assert!(parse_config(&toml).is_err());
  }

  #[test]
  fn test_rejects_zero_arbitrage_every() {
    let toml = format!("[poller]\narbitrage_every = 0\n{MINIMAL}");
    assert!(parse_config(&toml).is_err());
  }

  #[test]
  fn test_rejects_empty_venues() {
    assert!(parse_config("venues = []").is_err());
  }
}
