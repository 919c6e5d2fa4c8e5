//! Domain layer - configuration, faults, identifiers and the deferred reply
//! slot.

pub mod config;
pub mod correlation;
pub mod deferred;
pub mod env;
pub mod error;
pub mod types;

pub use config::*;
pub use correlation::*;
pub use deferred::*;
pub use error::*;
pub use types::*;
