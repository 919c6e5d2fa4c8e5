//! Ports - interfaces to the rest of the manager.

pub mod outbound;

pub use outbound::*;
