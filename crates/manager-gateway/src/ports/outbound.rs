//! Outbound ports - the collaborators the gateway drives.
//!
//! | Port            | Owns                                              |
//! |-----------------|---------------------------------------------------|
//! | `SupervisorCore`| units, jobs, snapshots, environment, exit request |
//! | `UnitFileStore` | enable/disable/mask/link semantics                |
//! | `AccessPolicy`  | the allow/deny decision                           |
//! | `LogControl`    | log level and target                              |
//! | `SystemProbe`   | taint, virtualization and file-system checks      |
//!
//! None of these are implemented here beyond the small defaults at the
//! bottom (`HostProbe`).

use crate::auth::{AccessVerb, CallerIdentity};
use crate::domain::types::{
    AuxUnit, InstallChanges, JobInfo, JobMode, JobType, KillWho, ManagerCounters,
    ManagerExitCode, ManagerSettings, ManagerTimestamps, RunningScope, UnitFileChange,
    UnitFileEntry, UnitFileOperation, UnitFileState, UnitInfo,
};
use crate::telemetry::{LogLevel, LogTarget, TelemetryError};
use shared_bus::Value;
use std::path::{Path, PathBuf};

/// Errors reported by the supervisor core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Unit {0} does not exist.")]
    NoSuchUnit(String),

    #[error("Job {0} does not exist.")]
    NoSuchJob(u32),

    #[error("Unit {unit} failed to load: {reason}")]
    LoadFailed { unit: String, reason: String },

    #[error("Unit {0} already exists.")]
    UnitExists(String),

    /// The transaction for a new job could not be built.
    #[error("Transaction for {unit} is invalid: {reason}")]
    JobRejected { unit: String, reason: String },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotSupported(String),

    #[error("Out of memory.")]
    OutOfMemory,

    #[error("{0}")]
    Other(String),
}

/// Errors reported by the unit-file store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    #[error("Unit file {0} does not exist.")]
    NotFound(String),

    #[error("Invalid unit file name {0}.")]
    InvalidName(String),

    #[error("Unit file operation failed: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

/// The unit/job registry and manager state.
///
/// Reads take `&self`; everything that changes state takes `&mut self`.
/// Implementations must not block.
pub trait SupervisorCore: Send {
    /// A loaded unit by name or alias.
    fn get_unit(&self, name: &str) -> Option<UnitInfo>;

    /// The unit whose cgroup contains `pid`.
    fn get_unit_by_pid(&self, pid: u32) -> Option<UnitInfo>;

    /// Load a unit if needed. A unit without a file on disk loads with
    /// `LoadState::NotFound` rather than failing.
    fn load_unit(&mut self, name: &str) -> Result<UnitInfo, CoreError>;

    /// Queue a job and return it.
    fn queue_job(&mut self, unit: &str, job_type: JobType, mode: JobMode)
        -> Result<JobInfo, CoreError>;

    fn get_job(&self, id: u32) -> Option<JobInfo>;

    fn cancel_job(&mut self, id: u32) -> Result<(), CoreError>;

    fn clear_jobs(&mut self);

    fn reset_failed(&mut self);

    fn reset_failed_unit(&mut self, unit: &str) -> Result<(), CoreError>;

    fn kill_unit(&mut self, unit: &str, who: KillWho, signal: i32) -> Result<(), CoreError>;

    /// Apply `(name, value)` unit properties; `runtime` means not persisted.
    fn set_unit_properties(
        &mut self,
        unit: &str,
        runtime: bool,
        properties: &[(String, Value)],
    ) -> Result<(), CoreError>;

    /// Turn a freshly loaded, unreferenced not-found stub into a transient
    /// unit carrying `properties`, and finish loading it.
    fn make_transient(
        &mut self,
        unit: &str,
        properties: &[(String, Value)],
        aux: &[AuxUnit],
    ) -> Result<UnitInfo, CoreError>;

    fn list_units(&self) -> Vec<UnitInfo>;

    fn list_jobs(&self) -> Vec<JobInfo>;

    /// Full-text dump of units and jobs.
    fn dump(&self) -> String;

    /// Snapshot the current unit states. `None` auto-generates a name.
    fn create_snapshot(&mut self, name: Option<&str>, cleanup: bool)
        -> Result<UnitInfo, CoreError>;

    fn remove_snapshot(&mut self, name: &str) -> Result<(), CoreError>;

    /// Ask the main loop to leave with `code` after the current iteration.
    fn request_exit(&mut self, code: ManagerExitCode);

    /// Record the target of a pending switch-root.
    fn set_switch_root(&mut self, root: &str, init: Option<&str>);

    fn environment(&self) -> Vec<String>;

    fn set_environment(&mut self, environment: Vec<String>);

    fn counters(&self) -> ManagerCounters;

    fn timestamps(&self) -> ManagerTimestamps;

    fn settings(&self) -> ManagerSettings;

    fn runtime_watchdog_usec(&self) -> u64;

    /// Re-arms the hardware watchdog; may fail.
    fn set_runtime_watchdog_usec(&mut self, usec: u64) -> Result<(), CoreError>;

    fn shutdown_watchdog_usec(&self) -> u64;

    fn set_shutdown_watchdog_usec(&mut self, usec: u64);
}

/// Persistent unit-file manipulation.
pub trait UnitFileStore: Send {
    fn list(&self, scope: RunningScope) -> Result<Vec<UnitFileEntry>, InstallError>;

    fn state(&self, scope: RunningScope, name: &str) -> Result<UnitFileState, InstallError>;

    fn default_target(&self, scope: RunningScope) -> Result<String, InstallError>;

    fn set_default_target(
        &mut self,
        scope: RunningScope,
        name: &str,
        force: bool,
    ) -> Result<Vec<UnitFileChange>, InstallError>;

    /// Run one batch operation. An error discards the whole change list.
    fn apply(
        &mut self,
        scope: RunningScope,
        operation: UnitFileOperation,
        files: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<InstallChanges, InstallError>;
}

/// What is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    pub verb: AccessVerb,
    /// Set for per-unit checks.
    pub unit: Option<&'a str>,
}

/// Policy verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(String),
}

/// The authorization decision function.
pub trait AccessPolicy: Send + Sync {
    fn check(&self, caller: &CallerIdentity, request: &AccessRequest<'_>) -> AccessDecision;
}

/// Process-wide log configuration.
pub trait LogControl: Send + Sync {
    fn level(&self) -> LogLevel;

    fn set_level(&self, level: LogLevel) -> Result<(), TelemetryError>;

    fn target(&self) -> LogTarget;

    fn set_target(&self, target: LogTarget) -> Result<(), TelemetryError>;
}

/// Host facts used by the Tainted and Virtualization properties and by
/// SwitchRoot validation.
pub trait SystemProbe: Send + Sync {
    /// Virtualization or container id, empty when bare metal.
    fn virtualization(&self) -> String;

    fn mtab_is_symlink(&self) -> bool;

    fn cgroups_available(&self) -> bool;

    fn hwclock_is_localtime(&self) -> bool;

    /// `root` carries an `/etc/os-release`.
    fn is_os_tree(&self, root: &Path) -> bool;

    fn is_executable(&self, path: &Path) -> bool;
}

/// `SystemProbe` reading the real file system, optionally below a prefix.
#[derive(Debug, Clone, Default)]
pub struct HostProbe {
    prefix: PathBuf,
}

impl HostProbe {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: PathBuf::from("/"),
        }
    }

    /// Resolve host paths below `prefix` instead of `/`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn host(&self, absolute: &str) -> PathBuf {
        self.prefix.join(absolute.trim_start_matches('/'))
    }
}

impl SystemProbe for HostProbe {
    fn virtualization(&self) -> String {
        std::fs::read_to_string(self.host("/run/systemd/container"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn mtab_is_symlink(&self) -> bool {
        std::fs::symlink_metadata(self.host("/etc/mtab"))
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn cgroups_available(&self) -> bool {
        self.host("/proc/cgroups").exists()
    }

    fn hwclock_is_localtime(&self) -> bool {
        std::fs::read_to_string(self.host("/etc/adjtime"))
            .map(|s| s.lines().nth(2).is_some_and(|l| l.trim() == "LOCAL"))
            .unwrap_or(false)
    }

    fn is_os_tree(&self, root: &Path) -> bool {
        root.join("etc/os-release").exists()
    }

    fn is_executable(&self, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            meta.is_file() && meta.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        {
            meta.is_file()
        }
    }
}
