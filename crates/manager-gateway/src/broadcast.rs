//! Broadcast engine - fans manager signals out to subscribers.
//!
//! ```text
//!   subscribers   delivery
//!   ───────────   ──────────────────────────────────────────────────
//!        0        nothing
//!        1        that subscriber's connection, addressed to its name
//!       ≥2        every open private connection, then the api bus,
//!                 all unaddressed
//! ```
//!
//! The single-subscriber case saves waking every client on the shared bus.
//! A failed send does not stop the remaining ones; the first error is
//! reported once every target has been tried.

use crate::connections::ConnectionSet;
use crate::domain::types::{manager_path, JobResult, MANAGER_INTERFACE};
use crate::subscribers::SubscriberRegistry;
use shared_bus::{BusConnection, Message, ObjectPath, SendError, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Signals emitted on the manager interface.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerSignal {
    UnitNew {
        id: String,
        path: ObjectPath,
    },
    UnitRemoved {
        id: String,
        path: ObjectPath,
    },
    JobNew {
        id: u32,
        path: ObjectPath,
        unit: String,
    },
    JobRemoved {
        id: u32,
        path: ObjectPath,
        unit: String,
        result: JobResult,
    },
    /// Boot phase durations in microseconds.
    StartupFinished {
        firmware: u64,
        loader: u64,
        kernel: u64,
        initrd: u64,
        userspace: u64,
        total: u64,
    },
    UnitFilesChanged,
    /// `true` when a reload starts, `false` when it is done.
    Reloading(bool),
}

impl ManagerSignal {
    #[must_use]
    pub fn member(&self) -> &'static str {
        match self {
            ManagerSignal::UnitNew { .. } => "UnitNew",
            ManagerSignal::UnitRemoved { .. } => "UnitRemoved",
            ManagerSignal::JobNew { .. } => "JobNew",
            ManagerSignal::JobRemoved { .. } => "JobRemoved",
            ManagerSignal::StartupFinished { .. } => "StartupFinished",
            ManagerSignal::UnitFilesChanged => "UnitFilesChanged",
            ManagerSignal::Reloading(_) => "Reloading",
        }
    }

    /// Signal arguments in wire order.
    #[must_use]
    pub fn body(&self) -> Vec<Value> {
        match self {
            ManagerSignal::UnitNew { id, path } | ManagerSignal::UnitRemoved { id, path } => {
                vec![id.as_str().into(), path.clone().into()]
            }
            ManagerSignal::JobNew { id, path, unit } => {
                vec![(*id).into(), path.clone().into(), unit.as_str().into()]
            }
            ManagerSignal::JobRemoved {
                id,
                path,
                unit,
                result,
            } => vec![
                (*id).into(),
                path.clone().into(),
                unit.as_str().into(),
                result.as_str().into(),
            ],
            ManagerSignal::StartupFinished {
                firmware,
                loader,
                kernel,
                initrd,
                userspace,
                total,
            } => [firmware, loader, kernel, initrd, userspace, total]
                .into_iter()
                .map(|t| Value::UInt64(*t))
                .collect(),
            ManagerSignal::UnitFilesChanged => Vec::new(),
            ManagerSignal::Reloading(active) => vec![(*active).into()],
        }
    }

    /// Build the signal message sent from `path` to `destination` (`None`
    /// broadcasts).
    #[must_use]
    pub fn to_message(&self, path: &ObjectPath, destination: Option<String>) -> Message {
        Message::signal(path.clone(), MANAGER_INTERFACE, self.member(), self.body())
            .with_destination(destination)
    }
}

/// At least one send failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("signal delivery failed on {failed} target(s), {sent} sent: {first}")]
pub struct DeliveryError {
    /// The first failure, in delivery order.
    pub first: SendError,
    pub sent: usize,
    pub failed: usize,
}

/// Statistics for the engine
#[derive(Debug, Default)]
pub struct BroadcastStats {
    pub signals_emitted: AtomicU64,
    pub messages_sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub unicast_deliveries: AtomicU64,
}

/// Applies the 0/1/N delivery rule.
#[derive(Debug)]
pub struct BroadcastEngine {
    /// Object the signals are emitted from.
    path: ObjectPath,
    stats: BroadcastStats,
}

impl Default for BroadcastEngine {
    fn default() -> Self {
        Self::with_path(manager_path())
    }
}

impl BroadcastEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine emitting from `path` instead of the default manager object.
    #[must_use]
    pub fn with_path(path: ObjectPath) -> Self {
        Self {
            path,
            stats: BroadcastStats::default(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Deliver `signal`. Returns how many messages were sent.
    pub fn deliver(
        &self,
        registry: &SubscriberRegistry,
        connections: &ConnectionSet,
        signal: &ManagerSignal,
    ) -> Result<usize, DeliveryError> {
        self.stats.signals_emitted.fetch_add(1, Ordering::Relaxed);

        let mut outcome = Outcome::default();
        match registry.len() {
            0 => {}
            1 => {
                if let Some(subscriber) = registry.first() {
                    self.stats.unicast_deliveries.fetch_add(1, Ordering::Relaxed);
                    let message = signal.to_message(&self.path, subscriber.name.clone());
                    match connections.get(subscriber.connection) {
                        Some(connection) => outcome.record(connection.send(message)),
                        None => outcome.record(Err(SendError::Disconnected(subscriber.connection))),
                    }
                }
            }
            _ => {
                let targets: Vec<&Arc<dyn BusConnection>> = connections
                    .private()
                    .filter(|c| c.is_open())
                    .chain(connections.api())
                    .collect();
                for connection in targets {
                    outcome.record(connection.send(signal.to_message(&self.path, None)));
                }
            }
        }

        self.stats
            .messages_sent
            .fetch_add(outcome.sent as u64, Ordering::Relaxed);
        self.stats
            .send_failures
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);

        match outcome.first {
            None => {
                debug!(
                    signal = signal.member(),
                    subscribers = registry.len(),
                    sent = outcome.sent,
                    "Signal delivered"
                );
                Ok(outcome.sent)
            }
            Some(first) => {
                warn!(
                    signal = signal.member(),
                    sent = outcome.sent,
                    failed = outcome.failed,
                    error = %first,
                    "Signal delivery incomplete"
                );
                Err(DeliveryError {
                    first,
                    sent: outcome.sent,
                    failed: outcome.failed,
                })
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> &BroadcastStats {
        &self.stats
    }
}

#[derive(Default)]
struct Outcome {
    sent: usize,
    failed: usize,
    first: Option<SendError>,
}

impl Outcome {
    fn record(&mut self, result: Result<(), SendError>) {
        match result {
            Ok(()) => self.sent += 1,
            Err(e) => {
                self.failed += 1;
                self.first.get_or_insert(e);
            }
        }
    }
}
