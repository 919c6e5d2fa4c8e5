//! Authorization gate.
//!
//! Every handler names the access verb it needs. The gate asks the
//! configured [`AccessPolicy`] before the handler runs, and again for each
//! unit an operation touches.

use crate::domain::config::{AccessConfig, AccessPolicyKind};
use crate::domain::error::BusFault;
use crate::ports::outbound::{AccessDecision, AccessPolicy, AccessRequest};
use serde::{Deserialize, Serialize};
use shared_bus::ConnectionId;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Coarse access verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessVerb {
    Status,
    Start,
    Stop,
    Reload,
    Enable,
    Disable,
    Halt,
    Reboot,
}

impl AccessVerb {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessVerb::Status => "status",
            AccessVerb::Start => "start",
            AccessVerb::Stop => "stop",
            AccessVerb::Reload => "reload",
            AccessVerb::Enable => "enable",
            AccessVerb::Disable => "disable",
            AccessVerb::Halt => "halt",
            AccessVerb::Reboot => "reboot",
        }
    }
}

impl fmt::Display for AccessVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling, as far as the transport can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub connection: ConnectionId,
    /// Unique bus name; absent on private connections.
    pub sender: Option<String>,
    pub uid: Option<u32>,
    pub pid: Option<u32>,
}

impl CallerIdentity {
    #[must_use]
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            sender: None,
            uid: None,
            pid: None,
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    #[must_use]
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

/// Wraps the policy and turns denials into `AccessDenied` faults.
#[derive(Clone)]
pub struct AuthorizationGate {
    policy: Arc<dyn AccessPolicy>,
}

impl AuthorizationGate {
    pub fn new(policy: Arc<dyn AccessPolicy>) -> Self {
        Self { policy }
    }

    /// Build the gate described by the access configuration.
    #[must_use]
    pub fn from_config(config: &AccessConfig) -> Self {
        match config.policy {
            AccessPolicyKind::AllowAll => Self::new(Arc::new(AllowAll)),
            AccessPolicyKind::Uid => Self::new(Arc::new(UidAccessPolicy::new(
                config.privileged_uids.iter().copied(),
            ))),
        }
    }

    /// Coarse check before a handler runs.
    pub fn check(&self, caller: &CallerIdentity, verb: AccessVerb) -> Result<(), BusFault> {
        self.decide(caller, AccessRequest { verb, unit: None })
    }

    /// Check against one specific unit.
    pub fn check_unit(
        &self,
        caller: &CallerIdentity,
        verb: AccessVerb,
        unit: &str,
    ) -> Result<(), BusFault> {
        self.decide(
            caller,
            AccessRequest {
                verb,
                unit: Some(unit),
            },
        )
    }

    fn decide(&self, caller: &CallerIdentity, request: AccessRequest<'_>) -> Result<(), BusFault> {
        match self.policy.check(caller, &request) {
            AccessDecision::Allow => {
                debug!(
                    connection = %caller.connection,
                    verb = %request.verb,
                    unit = request.unit.unwrap_or(""),
                    "Access granted"
                );
                Ok(())
            }
            AccessDecision::Deny(reason) => {
                warn!(
                    connection = %caller.connection,
                    sender = caller.sender.as_deref().unwrap_or(""),
                    verb = %request.verb,
                    unit = request.unit.unwrap_or(""),
                    "Access denied"
                );
                Err(BusFault::access_denied(reason))
            }
        }
    }
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate").finish_non_exhaustive()
    }
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check(&self, _caller: &CallerIdentity, _request: &AccessRequest<'_>) -> AccessDecision {
        AccessDecision::Allow
    }
}

/// Status is open to everyone; every other verb needs a privileged uid.
#[derive(Debug, Clone, Default)]
pub struct UidAccessPolicy {
    privileged: BTreeSet<u32>,
}

impl UidAccessPolicy {
    pub fn new(privileged: impl IntoIterator<Item = u32>) -> Self {
        Self {
            privileged: privileged.into_iter().collect(),
        }
    }
}

impl AccessPolicy for UidAccessPolicy {
    fn check(&self, caller: &CallerIdentity, request: &AccessRequest<'_>) -> AccessDecision {
        if request.verb == AccessVerb::Status {
            return AccessDecision::Allow;
        }
        match caller.uid {
            Some(uid) if self.privileged.contains(&uid) => AccessDecision::Allow,
            Some(uid) => AccessDecision::Deny(format!(
                "Access denied: uid {} may not {}.",
                uid, request.verb
            )),
            None => AccessDecision::Deny(format!(
                "Access denied: unknown caller may not {}.",
                request.verb
            )),
        }
    }
}
