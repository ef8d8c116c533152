//! Channel Connection - mpsc-backed Egress Handle
//!
//! Lets a transport session (WebSocket writer task, SSE stream, test
//! harness) register with the connection manager and drain messages from
//! a bounded queue at its own pace.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::domain::error::SendError;
use crate::domain::message::Message;
use crate::ports::connection::{Connection, ConnectionId};

/// Default depth of a connection's outbound queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// A [`Connection`] that forwards into a bounded channel.
///
/// A full queue drops the message for this connection only; a dropped
/// receiver fails the send so the manager removes the connection.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Message>,
}

impl ChannelConnection {
    /// Create a connection and the receiver its transport drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, message: &Message) -> Result<(), SendError> {
        match self.tx.try_send(message.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(connection = %self.id, kind = message.kind(), "Outbound queue full, dropping message");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Pair;
    use crate::domain::message::TickerPayload;

    fn message(price: f64) -> Message {
        Message::Ticker(TickerPayload {
            exchange: "binance".to_string(),
            pair: Pair::default(),
            price,
            timestamp: 0,
        })
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_error() {
        let (conn, mut rx) = ChannelConnection::new(1);
        conn.send(&message(1.0)).await.unwrap();
        conn.send(&message(2.0)).await.unwrap();

        assert_eq!(rx.recv().await, Some(message(1.0)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receiver_fails_send() {
        let (conn, rx) = ChannelConnection::new(4);
        drop(rx);
        assert_eq!(conn.send(&message(1.0)).await, Err(SendError::Closed));
    }
}
