//! Subscriber registry.
//!
//! A subscriber is one `(connection, name)` pair. On the shared bus many
//! clients sit behind one connection and are told apart by unique name; a
//! private connection has no name.

use shared_bus::ConnectionId;
use std::collections::BTreeSet;
use tracing::debug;

/// One registered signal receiver.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subscriber {
    pub connection: ConnectionId,
    pub name: Option<String>,
}

impl Subscriber {
    pub fn new(connection: ConnectionId, name: Option<String>) -> Self {
        Self { connection, name }
    }
}

/// Set of subscribers, iterated in `(connection, name)` order.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: BTreeSet<Subscriber>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn subscribe(&mut self, subscriber: Subscriber) -> bool {
        let added = self.subscribers.insert(subscriber);
        debug!(subscribers = self.subscribers.len(), added, "subscribe");
        added
    }

    /// Remove a subscriber. Returns `false` if it was not present.
    pub fn unsubscribe(&mut self, subscriber: &Subscriber) -> bool {
        let removed = self.subscribers.remove(subscriber);
        debug!(subscribers = self.subscribers.len(), removed, "unsubscribe");
        removed
    }

    /// Drop subscribers that went away. With `name` only that name's entry
    /// on `connection` goes; without it every entry on `connection` goes.
    /// Returns how many were removed.
    pub fn remove_on_disconnect(&mut self, connection: ConnectionId, name: Option<&str>) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| {
            s.connection != connection || name.is_some_and(|n| s.name.as_deref() != Some(n))
        });
        let removed = before - self.subscribers.len();
        if removed > 0 {
            debug!(connection = %connection, removed, "subscribers dropped on disconnect");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, subscriber: &Subscriber) -> bool {
        self.subscribers.contains(subscriber)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Subscriber> {
        self.subscribers.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscriber> {
        self.subscribers.iter()
    }
}
