//! # Shared Bus - Typed Messages for the Manager Control Bus
//!
//! The wire-level contract the gateway relies on. Serialization to actual
//! bytes belongs to the transport; this crate only fixes the typed shape of
//! what goes over it.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Signature   │──▶│    Value     │──▶│     Message      │
//! │ "ssa(sv)"    │   │ typed args   │   │ call/return/err/ │
//! └──────────────┘   └──────────────┘   │ signal + body    │
//!                                       └────────┬─────────┘
//!                                                │ send()
//!                                       ┌────────▼─────────┐
//!                                       │  BusConnection   │
//!                                       │ (private / api)  │
//!                                       └──────────────────┘
//! ```
//!
//! - **Signature:** parsed type strings; `check()` explains mismatches.
//! - **Message:** method calls, returns, errors and signals with reply
//!   correlation through `reply_serial`.
//! - **BusConnection:** one transport endpoint. `channel` provides an
//!   in-memory implementation over tokio mpsc.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod channel;
pub mod connection;
pub mod error;
pub mod message;
pub mod path;
pub mod signature;
pub mod value;

// Re-export main types
pub use channel::{channel_connection, ChannelConnection};
pub use connection::{BusConnection, ConnectionId};
pub use error::{SendError, SignatureError};
pub use message::{Message, MessageFlags, MessageKind};
pub use path::ObjectPath;
pub use signature::{Signature, Type};
pub use value::Value;

/// Well-known name of the bus daemon's own properties interface.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Maximum nesting depth accepted when parsing signatures.
pub const MAX_SIGNATURE_DEPTH: usize = 32;
