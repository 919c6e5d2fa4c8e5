//! Gateway configuration with validation.
//!
//! Loaded from JSON (every section defaults), then optionally overridden
//! from the environment:
//!
//! - `GATEWAY_SCOPE`: `system` or `user`
//! - `GATEWAY_QUEUE_CAPACITY`: event-loop queue depth

use crate::domain::types::{RunningScope, MANAGER_PATH};
use serde::{Deserialize, Serialize};
use shared_bus::ObjectPath;
use std::path::Path;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Manager identity and scope
    pub manager: ManagerConfig,
    /// Bus object configuration
    pub bus: BusConfig,
    /// Event loop sizing
    pub event_loop: EventLoopConfig,
    /// Authorization policy
    pub access: AccessConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manager.version.trim().is_empty() {
            return Err(ConfigError::Invalid("manager.version cannot be empty".into()));
        }

        if ObjectPath::new(self.bus.object_path.as_str()).is_err() {
            return Err(ConfigError::Invalid(format!(
                "bus.object_path \"{}\" is not a valid object path",
                self.bus.object_path
            )));
        }

        if self.event_loop.queue_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "event_loop.queue_capacity cannot be 0".into(),
            ));
        }

        if self.access.policy == AccessPolicyKind::Uid && self.access.privileged_uids.is_empty() {
            return Err(ConfigError::Invalid(
                "access.privileged_uids cannot be empty with the uid policy".into(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_json_str(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, then re-validate.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(scope) = lookup("GATEWAY_SCOPE") {
            self.manager.scope = scope
                .trim()
                .parse()
                .map_err(|()| ConfigError::Invalid(format!("unknown scope \"{}\"", scope)))?;
        }

        if let Some(capacity) = lookup("GATEWAY_QUEUE_CAPACITY") {
            self.event_loop.queue_capacity = capacity.trim().parse().map_err(|_| {
                ConfigError::InvalidLimit(format!("queue capacity \"{}\" is not a number", capacity))
            })?;
        }

        self.validate()
    }
}

/// Manager identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// System or user manager
    pub scope: RunningScope,
    /// Reported as the Version property
    pub version: String,
    /// Reported as the Features property
    pub features: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scope: RunningScope::System,
            version: env!("CARGO_PKG_VERSION").to_string(),
            features: "+PAM +AUDIT +SELINUX +IMA +SYSVINIT +LIBCRYPTSETUP +GCRYPT +ACL +XZ"
                .to_string(),
        }
    }
}

/// Bus object configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Path the manager object is served at
    pub object_path: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            object_path: MANAGER_PATH.to_string(),
        }
    }
}

/// Event loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Bounded queue between producers and the loop
    pub queue_capacity: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Which built-in access policy to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicyKind {
    /// Everything is allowed
    AllowAll,
    /// Status for everyone, everything else for privileged uids
    Uid,
}

/// Authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub policy: AccessPolicyKind,
    /// Uids allowed to perform privileged verbs
    pub privileged_uids: Vec<u32>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            policy: AccessPolicyKind::Uid,
            privileged_uids: vec![0],
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Malformed JSON
    #[error("parse error: {0}")]
    Parse(String),
    /// File could not be read
    #[error("io error: {0}")]
    Io(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
