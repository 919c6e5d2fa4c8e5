//! Gateway error types.
//!
//! `BusFault` is what a caller sees: a stable error name plus a
//! human-readable message, sent back as an error reply. `GatewayError` covers
//! failures of the gateway itself (configuration, telemetry, transport).

use crate::domain::config::ConfigError;
use crate::ports::outbound::{CoreError, InstallError};
use crate::telemetry::TelemetryError;
use serde::{Deserialize, Serialize};
use shared_bus::{Message, SendError, SignatureError};
use std::fmt;

/// Stable error names.
pub mod names {
    // Manager-specific faults
    pub const NO_SUCH_UNIT: &str = "org.freedesktop.systemd1.NoSuchUnit";
    pub const NO_UNIT_FOR_PID: &str = "org.freedesktop.systemd1.NoUnitForPID";
    pub const NO_SUCH_JOB: &str = "org.freedesktop.systemd1.NoSuchJob";
    pub const UNIT_EXISTS: &str = "org.freedesktop.systemd1.UnitExists";
    pub const LOAD_FAILED: &str = "org.freedesktop.systemd1.LoadFailed";
    pub const TRANSACTION_FAILED: &str = "org.freedesktop.systemd1.TransactionFailed";
    pub const ALREADY_SUBSCRIBED: &str = "org.freedesktop.systemd1.AlreadySubscribed";
    pub const NOT_SUBSCRIBED: &str = "org.freedesktop.systemd1.NotSubscribed";
    pub const RELOAD_IN_PROGRESS: &str = "org.freedesktop.systemd1.ReloadInProgress";

    // Generic bus faults
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const NOT_SUPPORTED: &str = "org.freedesktop.DBus.Error.NotSupported";
    pub const ACCESS_DENIED: &str = "org.freedesktop.DBus.Error.AccessDenied";
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    pub const UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
    pub const PROPERTY_READ_ONLY: &str = "org.freedesktop.DBus.Error.PropertyReadOnly";
    pub const NO_MEMORY: &str = "org.freedesktop.DBus.Error.NoMemory";
    pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";
}

/// Symbolic fault kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    NoSuchUnit,
    NoUnitForPid,
    NoSuchJob,
    UnitExists,
    LoadFailed,
    TransactionFailed,
    AlreadySubscribed,
    NotSubscribed,
    ReloadInProgress,
    InvalidArgs,
    NotSupported,
    AccessDenied,
    UnknownMethod,
    UnknownObject,
    UnknownInterface,
    UnknownProperty,
    PropertyReadOnly,
    NoMemory,
    Failed,
}

impl FaultKind {
    /// Error name put on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FaultKind::NoSuchUnit => names::NO_SUCH_UNIT,
            FaultKind::NoUnitForPid => names::NO_UNIT_FOR_PID,
            FaultKind::NoSuchJob => names::NO_SUCH_JOB,
            FaultKind::UnitExists => names::UNIT_EXISTS,
            FaultKind::LoadFailed => names::LOAD_FAILED,
            FaultKind::TransactionFailed => names::TRANSACTION_FAILED,
            FaultKind::AlreadySubscribed => names::ALREADY_SUBSCRIBED,
            FaultKind::NotSubscribed => names::NOT_SUBSCRIBED,
            FaultKind::ReloadInProgress => names::RELOAD_IN_PROGRESS,
            FaultKind::InvalidArgs => names::INVALID_ARGS,
            FaultKind::NotSupported => names::NOT_SUPPORTED,
            FaultKind::AccessDenied => names::ACCESS_DENIED,
            FaultKind::UnknownMethod => names::UNKNOWN_METHOD,
            FaultKind::UnknownObject => names::UNKNOWN_OBJECT,
            FaultKind::UnknownInterface => names::UNKNOWN_INTERFACE,
            FaultKind::UnknownProperty => names::UNKNOWN_PROPERTY,
            FaultKind::PropertyReadOnly => names::PROPERTY_READ_ONLY,
            FaultKind::NoMemory => names::NO_MEMORY,
            FaultKind::Failed => names::FAILED,
        }
    }
}

/// A protocol-level fault returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFault {
    pub kind: FaultKind,
    pub message: String,
}

impl BusFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wire name of this fault.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Build the error reply for `call`.
    #[must_use]
    pub fn to_message(&self, call: &Message) -> Message {
        Message::error(call, self.name(), self.message.clone())
    }

    // Lookups

    pub fn no_such_unit(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NoSuchUnit, message)
    }

    /// `Unit <name> not loaded.`
    pub fn unit_not_loaded(name: &str) -> Self {
        Self::no_such_unit(format!("Unit {} not loaded.", name))
    }

    pub fn no_unit_for_pid(pid: u32) -> Self {
        Self::new(
            FaultKind::NoUnitForPid,
            format!("PID {} does not belong to any loaded unit.", pid),
        )
    }

    pub fn no_such_job(id: u32) -> Self {
        Self::new(FaultKind::NoSuchJob, format!("Job {} does not exist.", id))
    }

    pub fn unit_exists(name: &str) -> Self {
        Self::new(FaultKind::UnitExists, format!("Unit {} already exists.", name))
    }

    // Subscription

    pub fn already_subscribed() -> Self {
        Self::new(FaultKind::AlreadySubscribed, "Client is already subscribed.")
    }

    pub fn not_subscribed() -> Self {
        Self::new(FaultKind::NotSubscribed, "Client is not subscribed.")
    }

    pub fn reload_in_progress() -> Self {
        Self::new(
            FaultKind::ReloadInProgress,
            "A reload is already in progress.",
        )
    }

    // Generic

    pub fn invalid_args(details: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidArgs, details)
    }

    pub fn not_supported(details: impl Into<String>) -> Self {
        Self::new(FaultKind::NotSupported, details)
    }

    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::new(FaultKind::AccessDenied, reason)
    }

    pub fn unknown_method(interface: &str, member: &str) -> Self {
        Self::new(
            FaultKind::UnknownMethod,
            format!("Unknown method '{}' on interface '{}'.", member, interface),
        )
    }

    pub fn unknown_object(path: &str) -> Self {
        Self::new(
            FaultKind::UnknownObject,
            format!("Unknown object '{}'.", path),
        )
    }

    pub fn unknown_interface(interface: &str) -> Self {
        Self::new(
            FaultKind::UnknownInterface,
            format!("Unknown interface '{}'.", interface),
        )
    }

    pub fn unknown_property(name: &str) -> Self {
        Self::new(
            FaultKind::UnknownProperty,
            format!("Unknown property '{}'.", name),
        )
    }

    pub fn property_read_only(name: &str) -> Self {
        Self::new(
            FaultKind::PropertyReadOnly,
            format!("Property '{}' is not writable.", name),
        )
    }

    pub fn no_memory() -> Self {
        Self::new(FaultKind::NoMemory, "Out of memory.")
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self::new(FaultKind::Failed, details)
    }
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.name(), self.message)
    }
}

impl std::error::Error for BusFault {}

impl Serialize for BusFault {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BusFault", 2)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

// Collaborator errors map onto faults at the dispatcher boundary

impl From<CoreError> for BusFault {
    fn from(e: CoreError) -> Self {
        let kind = match &e {
            CoreError::NoSuchUnit(_) => FaultKind::NoSuchUnit,
            CoreError::NoSuchJob(_) => FaultKind::NoSuchJob,
            CoreError::LoadFailed { .. } => FaultKind::LoadFailed,
            CoreError::UnitExists(_) => FaultKind::UnitExists,
            CoreError::JobRejected { .. } => FaultKind::TransactionFailed,
            CoreError::InvalidArgument(_) => FaultKind::InvalidArgs,
            CoreError::NotSupported(_) => FaultKind::NotSupported,
            CoreError::OutOfMemory => FaultKind::NoMemory,
            CoreError::Other(_) => FaultKind::Failed,
        };
        BusFault::new(kind, e.to_string())
    }
}

impl From<InstallError> for BusFault {
    fn from(e: InstallError) -> Self {
        let kind = match &e {
            InstallError::NotFound(_) => FaultKind::NoSuchUnit,
            InstallError::InvalidName(_) => FaultKind::InvalidArgs,
            InstallError::Io(_) | InstallError::Other(_) => FaultKind::Failed,
        };
        BusFault::new(kind, e.to_string())
    }
}

impl From<SignatureError> for BusFault {
    fn from(e: SignatureError) -> Self {
        BusFault::invalid_args(e.to_string())
    }
}

/// Result type for handler operations
pub type FaultResult<T> = Result<T, BusFault>;

/// Gateway-level errors (internal, never sent to callers)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tracing setup or log control failure
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Handler table carries a bad signature
    #[error("invalid handler signature: {0}")]
    Signature(#[from] SignatureError),

    /// Transport failure
    #[error("send error: {0}")]
    Send(#[from] SendError),

    /// The event loop is gone
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}
