//! # In-Memory Connections
//!
//! `ChannelConnection` writes into an unbounded tokio mpsc channel. The
//! receiving half stands in for the peer: tests and embedders drain it to
//! observe replies and signals in send order.

use crate::connection::{BusConnection, ConnectionId};
use crate::error::SendError;
use crate::message::Message;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Connection backed by an mpsc channel.
#[derive(Debug)]
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelConnection {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: ConnectionId::next(),
            tx,
        }
    }
}

impl BusConnection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: Message) -> Result<(), SendError> {
        trace!(connection = %self.id, serial = message.serial, "send");
        self.tx
            .send(message)
            .map_err(|_| SendError::Disconnected(self.id))
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Create a connection and the receiver that observes everything sent on it.
#[must_use]
pub fn channel_connection() -> (Arc<ChannelConnection>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelConnection::new(tx)), rx)
}
