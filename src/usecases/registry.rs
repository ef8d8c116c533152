//! Subscriber Registry - Bounded Per-Subscriber Fan-out
//!
//! Each subscriber owns a bounded queue. Publishing never blocks: when a
//! subscriber's queue is full the message is dropped for that subscriber
//! only, so a slow consumer cannot stall the producer or its peers.
//! Fresh data is preferred over complete data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use crate::domain::error::StreamError;
use crate::domain::message::Message;

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Identifier of a registered subscriber.
pub type SubscriberId = u64;

/// Receiving side of a subscription, handed to the transport layer.
#[derive(Debug)]
pub struct SubscriberHandle {
  id: SubscriberId,
  rx: mpsc::Receiver<Message>,
}

impl SubscriberHandle {
  /// Identifier to pass back to [`SubscriberRegistry::unsubscribe`].
  pub const fn id(&self) -> SubscriberId {
    self.id
  }

  /// Wait for the next message. `None` once unsubscribed and drained.
  pub async fn recv(&mut self) -> Option<Message> {
    self.rx.recv().await
  }

  /// Take the next message if one is queued.
  pub fn try_recv(&mut self) -> Option<Message> {
    self.rx.try_recv().ok()
  }

  /// Number of messages waiting in this subscriber's queue.
  pub fn pending(&self) -> usize {
    self.rx.len()
  }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
  /// Subscribers that accepted the message.
  pub delivered: usize,
  /// Subscribers whose queue was full.
  pub dropped: usize,
  /// Subscribers removed because their handle was dropped.
  pub pruned: usize,
}

/// Cumulative registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
  pub subscribers: usize,
  pub delivered_total: u64,
  pub dropped_total: u64,
}

/// Owns all subscriber queues.
pub struct SubscriberRegistry {
  /// Queue depth for new subscribers.
  capacity: usize,
  /// Subscriber ceiling (0 = unlimited).
  max_subscribers: usize,
  /// Next subscriber identifier.
  next_id: AtomicU64,
  /// Live queues by subscriber.
  queues: RwLock<HashMap<SubscriberId, mpsc::Sender<Message>>>,
  delivered_total: AtomicU64,
  dropped_total: AtomicU64,
}

impl SubscriberRegistry {
  /// Create a registry with the given queue depth and subscriber ceiling.
  pub fn new(capacity: usize, max_subscribers: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      max_subscribers,
      next_id: AtomicU64::new(1),
      queues: RwLock::new(HashMap::new()),
      delivered_total: AtomicU64::new(0),
      dropped_total: AtomicU64::new(0),
    }
  }

  /// Register a new subscriber with an empty bounded queue.
  pub fn subscribe(&self) -> Result<SubscriberHandle, StreamError> {
    let mut queues = self.queues.write();

    if self.max_subscribers > 0 && queues.len() >= self.max_subscribers {
      return Err(StreamError::SubscriberLimit(self.max_subscribers));
    }

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::channel(self.capacity);
    queues.insert(id, tx);

    info!(subscriber = id, total = queues.len(), "Subscriber registered");
    Ok(SubscriberHandle { id, rx })
  }

  /// Remove a subscriber. Idempotent.
  pub fn unsubscribe(&self, id: SubscriberId) -> bool {
    let removed = self.queues.write().remove(&id).is_some();
    if removed {
      info!(subscriber = id, "Subscriber removed");
    }
    removed
  }

  /// Offer `message` to every subscriber without blocking.
  pub fn publish(&self, message: &Message) -> PublishReport {
    let mut report = PublishReport::default();
    let mut closed = Vec::new();

    {
      let queues = self.queues.read();
      for (id, tx) in queues.iter() {
        match tx.try_send(message.clone()) {
          Ok(()) => report.delivered += 1,
          Err(TrySendError::Full(_)) => report.dropped += 1,
          Err(TrySendError::Closed(_)) => closed.push(*id),
        }
      }
    }

    if !closed.is_empty() {
      let mut queues = self.queues.write();
      for id in &closed {
        queues.remove(id);
      }
      report.pruned = closed.len();
      debug!(pruned = closed.len(), "Pruned subscribers with dropped handles");
    }

    self
      .delivered_total
      .fetch_add(report.delivered as u64, Ordering::Relaxed);
    self
      .dropped_total
      .fetch_add(report.dropped as u64, Ordering::Relaxed);

    report
  }

  /// Number of registered subscribers.
  pub fn len(&self) -> usize {
    self.queues.read().len()
  }

  /// Whether no subscriber is registered.
  pub fn is_empty(&self) -> bool {
    self.queues.read().is_empty()
  }

  /// Snapshot of the registry counters.
  pub fn stats(&self) -> RegistryStats {
    RegistryStats {
      subscribers: self.len(),
      delivered_total: self.delivered_total.load(Ordering::Relaxed),
      dropped_total: self.dropped_total.load(Ordering::Relaxed),
    }
  }
}

impl Default for SubscriberRegistry {
  fn default() -> Self {
    Self::new(DEFAULT_QUEUE_CAPACITY, 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::message::TickerPayload;

  fn tick(price: f64) -> Message {
    Message::Ticker(TickerPayload {
      exchange: "binance".to_string(),
      pair: "BTC/USDT".parse().unwrap(),
      price,
      timestamp: 0,
    })
  }

  fn price_of(msg: &Message) -> f64 {
    match msg {
      Message::Ticker(t) => t.price,
      other => panic!("unexpected message {other:?}"),
    }
  }

  #[test]
  fn test_publish_reaches_every_subscriber_in_order() {
    let registry = SubscriberRegistry::default();
    let mut a = registry.subscribe().unwrap();
    let mut b = registry.subscribe().unwrap();

    for i in 0..10 {
      let report = registry.publish(&tick(f64::from(i)));
      assert_eq!(report.delivered, 2);
    }

    for handle in [&mut a, &mut b] {
      let prices: Vec<f64> = std::iter::from_fn(|| handle.try_recv()).map(|m| price_of(&m)).collect();
      assert_eq!(prices, (0..10).map(f64::from).collect::<Vec<_>>());
    }
  }

  #[test]
  fn test_full_queue_drops_only_for_that_subscriber() {
    let registry = SubscriberRegistry::default();
    let slow = registry.subscribe().unwrap();
    let mut fast = registry.subscribe().unwrap();

    for i in 0..100 {
      registry.publish(&tick(f64::from(i)));
      // fast consumer keeps up
      assert!(fast.try_recv().is_some());
    }
    assert_eq!(slow.pending(), 100);

    let report = registry.publish(&tick(100.0));
    assert_eq!(report.dropped, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(slow.pending(), 100);
    assert_eq!(price_of(&fast.try_recv().unwrap()), 100.0);
    assert_eq!(registry.stats().dropped_total, 1);
  }

  #[test]
  fn test_unsubscribe_is_idempotent() {
    let registry = SubscriberRegistry::default();
    let handle = registry.subscribe().unwrap();
    assert!(registry.unsubscribe(handle.id()));
    assert!(!registry.unsubscribe(handle.id()));
    assert!(registry.is_empty());
  }

  #[test]
  fn test_dropped_handle_is_pruned_on_publish() {
    let registry = SubscriberRegistry::default();
    let handle = registry.subscribe().unwrap();
    drop(handle);

    let report = registry.publish(&tick(1.0));
    assert_eq!(report.pruned, 1);
    assert_eq!(registry.len(), 0);
  }

  #[test]
  fn test_subscriber_limit_rejects() {
    let registry = SubscriberRegistry::new(10, 2);
    let _a = registry.subscribe().unwrap();
    let _b = registry.subscribe().unwrap();
    assert_eq!(registry.subscribe().unwrap_err(), StreamError::SubscriberLimit(2));
  }

  #[test]
  fn test_subscribers_do_not_share_queues() {
    let registry = SubscriberRegistry::default();
    let mut a = registry.subscribe().unwrap();
    registry.publish(&tick(1.0));
    let mut b = registry.subscribe().unwrap();

    assert_eq!(a.pending(), 1);
    assert!(b.try_recv().is_none());
    assert_ne!(a.id(), b.id());
    assert!(a.try_recv().is_some());
  }
}
