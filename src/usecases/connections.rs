//! Connection Manager - Broadcast to Live Transport Connections
//!
//! Holds the set of egress handles registered by the transport layer, in
//! connect order. Broadcast sends to a snapshot of the set concurrently,
//! each send bounded by its own timeout, so connections may come and go
//! while a broadcast is in progress and a stalled peer never delays the
//! others. A failed send removes that connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::message::Message;
use crate::ports::connection::{Connection, ConnectionId};

/// Default upper bound on a single send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
  /// Connections that accepted the message.
  pub delivered: usize,
  /// Connections that did not answer within the send timeout.
  pub timed_out: usize,
  /// Connections removed after a failed send.
  pub removed: usize,
}

/// Owns the set of live connections.
pub struct ConnectionManager {
  /// Registered handles, oldest first.
  connections: RwLock<Vec<Arc<dyn Connection>>>,
  send_timeout: Duration,
  removed_total: AtomicU64,
  timed_out_total: AtomicU64,
}

impl ConnectionManager {
  /// Create an empty manager with the given per-send timeout.
  pub fn new(send_timeout: Duration) -> Self {
    Self {
      connections: RwLock::new(Vec::new()),
      send_timeout,
      removed_total: AtomicU64::new(0),
      timed_out_total: AtomicU64::new(0),
    }
  }

  /// Register a connection. Re-registering an id replaces the old handle
  /// in place.
  pub fn connect(&self, connection: Arc<dyn Connection>) {
    let id = connection.id();
    let total = {
      let mut connections = self.connections.write();
      match connections.iter().position(|c| c.id() == id) {
        Some(slot) => connections[slot] = connection,
        None => connections.push(connection),
      }
      connections.len()
    };
    info!(connection = %id, total, "Connection registered");
  }

  /// Remove a connection. Idempotent.
  pub fn disconnect(&self, id: ConnectionId) -> bool {
    let removed = {
      let mut connections = self.connections.write();
      let before = connections.len();
      connections.retain(|c| c.id() != id);
      connections.len() != before
    };
    if removed {
      info!(connection = %id, "Connection removed");
    }
    removed
  }

  /// Send `message` to every connection registered at call time.
  ///
  /// Sends run concurrently; the call takes at most one `send_timeout`
  /// however many peers are stalled.
  pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
    let snapshot: Vec<Arc<dyn Connection>> = self.connections.read().clone();
    let sends = snapshot
      .iter()
      .map(|connection| tokio::time::timeout(self.send_timeout, connection.send(message)));
    let outcomes = join_all(sends).await;

    let mut report = BroadcastReport::default();
    for (connection, outcome) in snapshot.iter().zip(outcomes) {
      match outcome {
        Ok(Ok(())) => report.delivered += 1,
        Ok(Err(e)) => {
          warn!(connection = %connection.id(), error = %e, "Send failed, dropping connection");
          if self.disconnect(connection.id()) {
            report.removed += 1;
          }
        }
        Err(_) => {
          debug!(
            connection = %connection.id(),
            kind = message.kind(),
            "Send timed out, message dropped for this connection"
          );
          report.timed_out += 1;
        }
      }
    }

    self
      .removed_total
      .fetch_add(report.removed as u64, Ordering::Relaxed);
    self
      .timed_out_total
      .fetch_add(report.timed_out as u64, Ordering::Relaxed);

    report
  }

  /// Number of registered connections.
  pub fn len(&self) -> usize {
    self.connections.read().len()
  }

  /// Whether no connection is registered.
  pub fn is_empty(&self) -> bool {
    self.connections.read().is_empty()
  }

  /// Whether `id` is currently registered.
  pub fn contains(&self, id: ConnectionId) -> bool {
    self.connections.read().iter().any(|c| c.id() == id)
  }

  /// Total connections removed after failed sends.
  pub fn removed_total(&self) -> u64 {
    self.removed_total.load(Ordering::Relaxed)
  }

  /// Total sends that timed out.
  pub fn timed_out_total(&self) -> u64 {
    self.timed_out_total.load(Ordering::Relaxed)
  }
}

impl Default for ConnectionManager {
  fn default() -> Self {
    Self::new(DEFAULT_SEND_TIMEOUT)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use async_trait::async_trait;
  use parking_lot::Mutex;
  use uuid::Uuid;

  use super::*;
  use crate::domain::error::SendError;
  use crate::domain::message::TickerPayload;

  struct Recording {
    id: ConnectionId,
    fail: bool,
    received: AtomicUsize,
  }

  impl Recording {
    fn new(fail: bool) -> Arc<Self> {
      Arc::new(Self {
        id: Uuid::new_v4(),
        fail,
        received: AtomicUsize::new(0),
      })
    }
  }

  #[async_trait]
  impl Connection for Recording {
    fn id(&self) -> ConnectionId {
      self.id
    }

    async fn send(&self, _message: &Message) -> Result<(), SendError> {
      if self.fail {
        return Err(SendError::Closed);
      }
      self.received.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  /// Disconnects a peer from inside its own send.
  struct Meddler {
    id: ConnectionId,
    manager: Arc<ConnectionManager>,
    victim: ConnectionId,
  }

  #[async_trait]
  impl Connection for Meddler {
    fn id(&self) -> ConnectionId {
      self.id
    }

    async fn send(&self, _message: &Message) -> Result<(), SendError> {
      self.manager.disconnect(self.victim);
      Ok(())
    }
  }

  struct Stalled {
    id: ConnectionId,
  }

  #[async_trait]
  impl Connection for Stalled {
    fn id(&self) -> ConnectionId {
      self.id
    }

    async fn send(&self, _message: &Message) -> Result<(), SendError> {
      std::future::pending::<()>().await;
      Ok(())
    }
  }

  fn message() -> Message {
    Message::Ticker(TickerPayload {
      exchange: "binance".to_string(),
      pair: "BTC/USDT".parse().unwrap(),
      price: 1.0,
      timestamp: 0,
    })
  }

  #[tokio::test]
  async fn test_failed_connection_is_removed_and_others_still_receive() {
    let manager = ConnectionManager::default();
    let first = Recording::new(false);
    let second = Recording::new(true);
    let third = Recording::new(false);
    manager.connect(first.clone());
    manager.connect(second.clone());
    manager.connect(third.clone());

    let report = manager.broadcast(&message()).await;

    assert_eq!(report.delivered, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(first.received.load(Ordering::SeqCst), 1);
    assert_eq!(third.received.load(Ordering::SeqCst), 1);
    assert!(!manager.contains(second.id));
    assert_eq!(manager.len(), 2);
  }

  #[tokio::test]
  async fn test_disconnect_during_broadcast_uses_snapshot() {
    let manager = Arc::new(ConnectionManager::default());
    let victim = Recording::new(false);
    manager.connect(victim.clone());
    manager.connect(Arc::new(Meddler {
      id: Uuid::new_v4(),
      manager: Arc::clone(&manager),
      victim: victim.id,
    }));

    let report = manager.broadcast(&message()).await;

    // The victim is either reached before the meddler runs or after it was
    // removed from the live set; iteration itself is never disturbed.
    assert!(report.delivered >= 1);
    assert!(!manager.contains(victim.id));
    assert_eq!(manager.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stalled_connection_times_out_but_stays() {
    let manager = ConnectionManager::new(Duration::from_millis(50));
    let stalled = Arc::new(Stalled { id: Uuid::new_v4() });
    let healthy = Recording::new(false);
    manager.connect(stalled.clone());
    manager.connect(healthy.clone());

    let report = manager.broadcast(&message()).await;

    assert_eq!(report.timed_out, 1);
    assert_eq!(report.delivered, 1);
    assert!(manager.contains(stalled.id));
    assert_eq!(manager.timed_out_total(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stalled_peers_cost_one_timeout_in_total() {
    let manager = ConnectionManager::default();
    for _ in 0..5 {
      manager.connect(Arc::new(Stalled { id: Uuid::new_v4() }));
    }
    let healthy = Recording::new(false);
    manager.connect(healthy.clone());

    let started = tokio::time::Instant::now();
    let report = manager.broadcast(&message()).await;

    assert!(started.elapsed() <= DEFAULT_SEND_TIMEOUT);
    assert_eq!(report.timed_out, 5);
    assert_eq!(report.delivered, 1);
    assert_eq!(healthy.received.load(Ordering::SeqCst), 1);
    assert_eq!(manager.len(), 6);
  }

  /// Appends its label to a shared log on every send.
  struct Labelled {
    id: ConnectionId,
    label: u8,
    log: Arc<Mutex<Vec<u8>>>,
  }

  #[async_trait]
  impl Connection for Labelled {
    fn id(&self) -> ConnectionId {
      self.id
    }

    async fn send(&self, _message: &Message) -> Result<(), SendError> {
      self.log.lock().push(self.label);
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_sends_follow_connect_order() {
    let manager = ConnectionManager::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    let ids: Vec<ConnectionId> = (0..8).map(|_| Uuid::new_v4()).collect();
    for (label, id) in ids.iter().enumerate() {
      manager.connect(Arc::new(Labelled {
        id: *id,
        label: u8::try_from(label).unwrap(),
        log: Arc::clone(&log),
      }));
    }

    manager.broadcast(&message()).await;
    assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4, 5, 6, 7]);

    // Replacing a handle keeps its slot; removal closes the gap.
    manager.connect(Arc::new(Labelled {
      id: ids[2],
      label: 20,
      log: Arc::clone(&log),
    }));
    manager.disconnect(ids[5]);
    log.lock().clear();

    manager.broadcast(&message()).await;
    assert_eq!(*log.lock(), vec![0, 1, 20, 3, 4, 6, 7]);
  }

  #[test]
  fn test_disconnect_is_idempotent() {
    let manager = ConnectionManager::default();
    let conn = Recording::new(false);
    manager.connect(conn.clone());
    assert!(manager.disconnect(conn.id));
    assert!(!manager.disconnect(conn.id));
    assert!(manager.is_empty());
  }
}
