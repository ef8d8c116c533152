//! Connection Port - Transport Egress Handles
//!
//! A `Connection` is owned by the transport layer (WebSocket session,
//! SSE stream, ...) and registered with the connection manager so the
//! poller can broadcast to it directly.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::SendError;
use crate::domain::message::Message;

/// Identifier of a registered connection.
pub type ConnectionId = Uuid;

/// Egress side of one client connection.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
  /// Stable identifier used for registration and removal.
  fn id(&self) -> ConnectionId;

  /// Deliver one message.
  ///
  /// An `Err` means the connection is unusable and will be dropped
  /// from the broadcast set.
  async fn send(&self, message: &Message) -> Result<(), SendError>;
}
