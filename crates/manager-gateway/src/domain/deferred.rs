//! Deferred Reply Tracker - holds the one Reload whose reply waits for the
//! reload to actually finish.
//!
//! ```text
//!            begin()                    complete()
//!   Idle ────────────▶ Pending(reply) ────────────▶ Idle   (reply sent once)
//!     ▲                    │
//!     │   discard_for()    │ endpoint went away
//!     └────────────────────┘                               (nothing sent)
//! ```
//!
//! A second `begin()` while Pending is refused with `ReloadInProgress`; no
//! second record is ever created.

use crate::connections::ConnectionSet;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::BusFault;
use shared_bus::{ConnectionId, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Everything needed to send the held reply later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeferredReply {
    /// Serial of the Reload call.
    pub reply_serial: u32,
    /// Connection the call arrived on.
    pub endpoint: ConnectionId,
    /// Caller's unique name, if it had one.
    pub destination: Option<String>,
    /// False when the call was flagged no-reply-expected.
    pub reply_expected: bool,
    pub correlation_id: CorrelationId,
    pub accepted_at: Instant,
}

/// Tracker state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeferredState {
    #[default]
    Idle,
    Pending(PendingDeferredReply),
}

/// What `complete()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredOutcome {
    /// No reply was pending.
    Idle,
    /// The held reply went out.
    Sent,
    /// The caller asked for no reply; the slot was released silently.
    NotRequested,
    /// The endpoint was gone or refused the send; the reply is dropped.
    Discarded,
}

/// Statistics for the tracker
#[derive(Debug, Default)]
pub struct DeferredStats {
    pub total_accepted: AtomicU64,
    pub total_rejected_busy: AtomicU64,
    pub total_sent: AtomicU64,
    pub total_discarded: AtomicU64,
}

/// Single-slot deferred reply tracker.
#[derive(Debug, Default)]
pub struct DeferredReplyTracker {
    state: DeferredState,
    stats: DeferredStats,
}

impl DeferredReplyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &DeferredState {
        &self.state
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, DeferredState::Pending(_))
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingDeferredReply> {
        match &self.state {
            DeferredState::Pending(p) => Some(p),
            DeferredState::Idle => None,
        }
    }

    /// Check that a new deferred reply could be accepted, without taking
    /// the slot. Handlers call this before causing any side effect.
    pub fn ensure_idle(&self) -> Result<(), BusFault> {
        if self.is_pending() {
            self.stats
                .total_rejected_busy
                .fetch_add(1, Ordering::Relaxed);
            return Err(BusFault::reload_in_progress());
        }
        Ok(())
    }

    /// Hold the reply to `call`, received on `endpoint`.
    pub fn begin(
        &mut self,
        call: &Message,
        endpoint: ConnectionId,
        correlation_id: CorrelationId,
    ) -> Result<(), BusFault> {
        self.ensure_idle()?;

        self.state = DeferredState::Pending(PendingDeferredReply {
            reply_serial: call.serial,
            endpoint,
            destination: call.sender.clone(),
            reply_expected: !call.flags.no_reply_expected,
            correlation_id,
            accepted_at: Instant::now(),
        });
        self.stats.total_accepted.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            reply_serial = call.serial,
            "Deferred reply registered"
        );
        Ok(())
    }

    /// Send the held reply, if any, and return to Idle.
    pub fn complete(&mut self, connections: &ConnectionSet) -> DeferredOutcome {
        let DeferredState::Pending(pending) = std::mem::take(&mut self.state) else {
            return DeferredOutcome::Idle;
        };

        let elapsed_ms = pending.accepted_at.elapsed().as_millis();
        if !pending.reply_expected {
            debug!(
                correlation_id = %pending.correlation_id,
                elapsed_ms = elapsed_ms,
                "Deferred call finished, no reply requested"
            );
            return DeferredOutcome::NotRequested;
        }

        let Some(connection) = connections.get(pending.endpoint) else {
            self.stats.total_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %pending.correlation_id,
                endpoint = %pending.endpoint,
                "Deferred reply endpoint gone, discarding"
            );
            return DeferredOutcome::Discarded;
        };

        let reply = Message::method_return_to(pending.reply_serial, pending.destination, Vec::new());
        match connection.send(reply) {
            Ok(()) => {
                self.stats.total_sent.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %pending.correlation_id,
                    elapsed_ms = elapsed_ms,
                    "Deferred reply sent"
                );
                DeferredOutcome::Sent
            }
            Err(e) => {
                self.stats.total_discarded.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %pending.correlation_id,
                    error = %e,
                    "Deferred reply send failed, discarding"
                );
                DeferredOutcome::Discarded
            }
        }
    }

    /// Drop the pending record if it belongs to `endpoint` (and, for the
    /// shared bus, to `name`). Returns whether a record was dropped.
    pub fn discard_for(&mut self, endpoint: ConnectionId, name: Option<&str>) -> bool {
        let owned = match &self.state {
            DeferredState::Pending(p) => {
                p.endpoint == endpoint
                    && name.map_or(true, |n| p.destination.as_deref() == Some(n))
            }
            DeferredState::Idle => false,
        };

        if owned {
            if let DeferredState::Pending(p) = std::mem::take(&mut self.state) {
                debug!(
                    correlation_id = %p.correlation_id,
                    endpoint = %endpoint,
                    "Deferred reply discarded on disconnect"
                );
            }
            self.stats.total_discarded.fetch_add(1, Ordering::Relaxed);
        }
        owned
    }

    #[must_use]
    pub fn stats(&self) -> &DeferredStats {
        &self.stats
    }
}
