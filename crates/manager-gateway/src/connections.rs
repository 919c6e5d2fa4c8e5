//! The set of transport connections the gateway can write to.
//!
//! ```text
//!   api bus ──────────────┐
//!                         ▼
//!   private conn 1 ──▶ ConnectionSet ──▶ replies, signals
//!   private conn 2 ──▶      ▲
//!                           └── added/removed by the transport layer
//! ```
//!
//! Private connections are peer-to-peer sockets (one client each). The api
//! connection is the shared bus where many clients sit behind one socket and
//! are told apart by their unique names.

use shared_bus::{BusConnection, ConnectionId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Open connections, iterated in id order.
#[derive(Default)]
pub struct ConnectionSet {
    private: BTreeMap<ConnectionId, Arc<dyn BusConnection>>,
    api: Option<Arc<dyn BusConnection>>,
}

impl ConnectionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the shared bus connection.
    pub fn set_api(&mut self, connection: Arc<dyn BusConnection>) {
        debug!(connection = %connection.id(), "api connection attached");
        self.api = Some(connection);
    }

    #[must_use]
    pub fn api(&self) -> Option<&Arc<dyn BusConnection>> {
        self.api.as_ref()
    }

    /// Track a new private connection.
    pub fn add_private(&mut self, connection: Arc<dyn BusConnection>) {
        debug!(connection = %connection.id(), "private connection added");
        self.private.insert(connection.id(), connection);
    }

    /// Forget a connection, private or api. Returns whether it was known.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        if self.private.remove(&id).is_some() {
            return true;
        }
        if self.api.as_ref().is_some_and(|api| api.id() == id) {
            self.api = None;
            return true;
        }
        false
    }

    /// Look up any known connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&Arc<dyn BusConnection>> {
        self.private
            .get(&id)
            .or_else(|| self.api.as_ref().filter(|api| api.id() == id))
    }

    #[must_use]
    pub fn is_api(&self, id: ConnectionId) -> bool {
        self.api.as_ref().is_some_and(|api| api.id() == id)
    }

    /// Private connections in id order.
    pub fn private(&self) -> impl Iterator<Item = &Arc<dyn BusConnection>> {
        self.private.values()
    }

    #[must_use]
    pub fn private_count(&self) -> usize {
        self.private.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::channel_connection;

    #[test]
    fn test_private_and_api_lookup() {
        let mut set = ConnectionSet::new();
        let (a, _ra) = channel_connection();
        let (api, _rapi) = channel_connection();
        set.add_private(a.clone());
        set.set_api(api.clone());

        assert!(set.get(a.id()).is_some());
        assert!(set.get(api.id()).is_some());
        assert!(set.is_api(api.id()));
        assert!(!set.is_api(a.id()));
        assert_eq!(set.private_count(), 1);
    }

    #[test]
    fn test_remove() {
        let mut set = ConnectionSet::new();
        let (a, _ra) = channel_connection();
        let (api, _rapi) = channel_connection();
        set.add_private(a.clone());
        set.set_api(api.clone());

        assert!(set.remove(a.id()));
        assert!(!set.remove(a.id()));
        assert!(set.remove(api.id()));
        assert!(set.api().is_none());
    }

    #[test]
    fn test_private_iterates_in_id_order() {
        let mut set = ConnectionSet::new();
        let (a, _ra) = channel_connection();
        let (b, _rb) = channel_connection();
        set.add_private(b.clone());
        set.add_private(a.clone());
        let ids: Vec<_> = set.private().map(|c| c.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }
}
