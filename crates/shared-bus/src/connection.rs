//! # Connections
//!
//! A `BusConnection` is one transport endpoint the gateway can write to:
//! the shared api bus or a private peer-to-peer connection. Identity is a
//! process-unique `ConnectionId`; subscriber bookkeeping and deferred
//! replies key on it.

use crate::error::SendError;
use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One writable endpoint.
pub trait BusConnection: Send + Sync {
    /// Stable identity of this endpoint.
    fn id(&self) -> ConnectionId;

    /// Queue a message for delivery.
    fn send(&self, message: Message) -> Result<(), SendError>;

    /// False once the remote end has gone away.
    fn is_open(&self) -> bool;
}
