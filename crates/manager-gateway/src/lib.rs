//! Manager Gateway - the control-plane request surface of a process
//! supervisor.
//!
//! Clients talk to the supervisor's manager object over a message bus, either
//! through the shared system bus or over private peer-to-peer connections.
//! This crate decodes those calls, decides whether the caller may make them,
//! runs them against the supervisor core and sends the answer back. It also
//! pushes state-change signals to the clients that asked for them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          MANAGER GATEWAY                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  GatewayHandle ──mpsc──▶ GatewayService::run (single task)          │
//! │                                   │                                 │
//! │                          ┌────────▼─────────┐                       │
//! │                          │    Dispatcher    │ (interface, member)   │
//! │                          │ in-sig ▸ gate ▸  │ lookup table          │
//! │                          │ handler ▸ out-sig│                       │
//! │                          └────────┬─────────┘                       │
//! │        ┌──────────────┬───────────┼──────────────┬──────────────┐   │
//! │        ▼              ▼           ▼              ▼              ▼   │
//! │  Authorization   Deferred     Subscriber     Broadcast      Property│
//! │      Gate        Reply slot   Registry       Engine         Accessor│
//! └────────┬──────────────┬───────────┬──────────────┬──────────────┬───┘
//!          │              │           │              │              │
//!     AccessPolicy   BusConnection ◀──┴──────────────┘        SupervisorCore
//!                                                             UnitFileStore
//!                                                             LogControl
//!                                                             SystemProbe
//! ```
//!
//! # Reply rules
//!
//! - Every method call gets exactly one reply, or none for the methods that
//!   never answer (`Reexecute`) and calls flagged no-reply-expected.
//! - `Reload` answers only after the reload has finished; the reply is held
//!   by [`domain::deferred::DeferredReplyTracker`].
//! - Replies are checked against the declared output signature; a malformed
//!   body is turned into a `Failed` fault rather than sent.
//!
//! # Signal delivery
//!
//! With one subscriber a signal is unicast to it. With two or more it is
//! broadcast once per private connection and once on the shared bus.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod auth;
pub mod broadcast;
pub mod connections;
pub mod context;
pub mod dispatch;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod properties;
pub mod service;
pub mod subscribers;
pub mod telemetry;

// Re-exports for public API
pub use auth::{AccessVerb, AllowAll, AuthorizationGate, CallerIdentity, UidAccessPolicy};
pub use broadcast::{BroadcastEngine, DeliveryError, ManagerSignal};
pub use connections::ConnectionSet;
pub use context::ManagerContext;
pub use dispatch::{Dispatcher, HandlerDescriptor, Reply};
pub use domain::config::GatewayConfig;
pub use domain::correlation::CorrelationId;
pub use domain::deferred::{DeferredOutcome, DeferredReplyTracker};
pub use domain::error::{BusFault, FaultKind, FaultResult, GatewayError};
pub use metrics::GatewayMetrics;
pub use properties::{PropertyAccessor, PropertyDescriptor};
pub use service::{GatewayEvent, GatewayHandle, GatewayService, ManagerGateway};
pub use subscribers::{Subscriber, SubscriberRegistry};
pub use telemetry::{init_tracing, LogLevel, LogTarget, TelemetryConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
