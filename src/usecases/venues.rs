//! Venue Directory - Exchange Lookup
//!
//! Maps an exchange id to its request/response client and, for venues
//! that have one, its push channel. Built once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::error::StreamError;
use crate::ports::exchange::ExchangeClient;
use crate::ports::push_feed::PushFeed;

/// Adapters for a single exchange.
#[derive(Clone)]
pub struct Venue {
  /// Request/response market data.
  pub client: Arc<dyn ExchangeClient>,
  /// Streaming trade channel, if the venue offers one.
  pub push: Option<Arc<dyn PushFeed>>,
}

/// All configured venues, keyed by lowercase exchange id.
#[derive(Clone, Default)]
pub struct VenueDirectory {
  venues: BTreeMap<String, Venue>,
}

impl VenueDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a venue. A later registration under the same id wins.
  pub fn register(&mut self, exchange: &str, client: Arc<dyn ExchangeClient>, push: Option<Arc<dyn PushFeed>>) {
    self
      .venues
      .insert(exchange.to_ascii_lowercase(), Venue { client, push });
  }

  /// Builder-style [`register`](Self::register).
  pub fn with_venue(mut self, exchange: &str, client: Arc<dyn ExchangeClient>, push: Option<Arc<dyn PushFeed>>) -> Self {
    self.register(exchange, client, push);
    self
  }

  /// Look up a venue.
  pub fn get(&self, exchange: &str) -> Result<&Venue, StreamError> {
    self
      .venues
      .get(&exchange.to_ascii_lowercase())
      .ok_or_else(|| StreamError::UnknownExchange(exchange.to_string()))
  }

  /// Whether `exchange` is configured.
  pub fn contains(&self, exchange: &str) -> bool {
    self.venues.contains_key(&exchange.to_ascii_lowercase())
  }

  /// Whether `exchange` is configured with a push channel.
  pub fn supports_push(&self, exchange: &str) -> bool {
    self.get(exchange).is_ok_and(|v| v.push.is_some())
  }

  /// Request/response clients of every venue, in id order.
  pub fn clients(&self) -> Vec<(String, Arc<dyn ExchangeClient>)> {
    self
      .venues
      .iter()
      .map(|(name, v)| (name.clone(), Arc::clone(&v.client)))
      .collect()
  }

  /// Configured exchange ids, in order.
  pub fn names(&self) -> Vec<&str> {
    self.venues.keys().map(String::as_str).collect()
  }

  pub fn len(&self) -> usize {
    self.venues.len()
  }

  pub fn is_empty(&self) -> bool {
    self.venues.is_empty()
  }
}
