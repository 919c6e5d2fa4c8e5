//! Domain types shared by handlers and collaborators.
//!
//! Everything the supervisor core reports back (units, jobs, counters,
//! timestamps) is a plain snapshot. The gateway never holds references into
//! the core's own data structures.

use serde::{Deserialize, Serialize};
use shared_bus::ObjectPath;
use std::fmt;
use std::str::FromStr;

/// Manager object path.
pub const MANAGER_PATH: &str = "/org/freedesktop/systemd1";

/// Manager interface name.
pub const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// `/org/freedesktop/systemd1`
#[must_use]
pub fn manager_path() -> ObjectPath {
    ObjectPath::root()
        .join_escaped("org")
        .join_escaped("freedesktop")
        .join_escaped("systemd1")
}

/// `/org/freedesktop/systemd1/unit/<escaped id>`
#[must_use]
pub fn unit_path(id: &str) -> ObjectPath {
    manager_path().join_escaped("unit").join_escaped(id)
}

/// `/org/freedesktop/systemd1/job/<id>`
#[must_use]
pub fn job_path(id: u32) -> ObjectPath {
    manager_path().join_escaped("job").join_number(u64::from(id))
}

/// Declares a string-mapped enum with `as_str`, `Display` and `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name { $($variant),+ }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self { $($name::$variant => $text),+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

string_enum! {
    /// Whether the manager runs for the whole system or one user session.
    pub enum RunningScope {
        System => "system",
        User => "user",
    }
}

string_enum! {
    /// Kind of work a job performs.
    pub enum JobType {
        Start => "start",
        VerifyActive => "verify-active",
        Stop => "stop",
        Reload => "reload",
        ReloadOrStart => "reload-or-start",
        Restart => "restart",
        TryRestart => "try-restart",
        Nop => "nop",
    }
}

string_enum! {
    /// How a new job interacts with already queued ones.
    pub enum JobMode {
        Fail => "fail",
        Replace => "replace",
        Isolate => "isolate",
        IgnoreDependencies => "ignore-dependencies",
        IgnoreRequirements => "ignore-requirements",
    }
}

string_enum! {
    pub enum JobState {
        Waiting => "waiting",
        Running => "running",
    }
}

string_enum! {
    /// Outcome carried by `JobRemoved`.
    pub enum JobResult {
        Done => "done",
        Canceled => "canceled",
        Timeout => "timeout",
        Failed => "failed",
        Dependency => "dependency",
        Skipped => "skipped",
    }
}

string_enum! {
    /// Which processes of a unit receive a kill signal.
    pub enum KillWho {
        Main => "main",
        Control => "control",
        All => "all",
    }
}

string_enum! {
    pub enum LoadState {
        Stub => "stub",
        Loaded => "loaded",
        NotFound => "not-found",
        Error => "error",
        Merged => "merged",
        Masked => "masked",
    }
}

string_enum! {
    pub enum ActiveState {
        Active => "active",
        Reloading => "reloading",
        Inactive => "inactive",
        Failed => "failed",
        Activating => "activating",
        Deactivating => "deactivating",
    }
}

string_enum! {
    /// Unit type, taken from the name suffix.
    pub enum UnitType {
        Service => "service",
        Socket => "socket",
        Target => "target",
        Device => "device",
        Mount => "mount",
        Automount => "automount",
        Swap => "swap",
        Timer => "timer",
        Path => "path",
        Slice => "slice",
        Scope => "scope",
        Snapshot => "snapshot",
    }
}

string_enum! {
    /// Default output routing for spawned processes.
    pub enum ExecOutput {
        Inherit => "inherit",
        Null => "null",
        Tty => "tty",
        Syslog => "syslog",
        SyslogAndConsole => "syslog+console",
        Kmsg => "kmsg",
        KmsgAndConsole => "kmsg+console",
        Journal => "journal",
        JournalAndConsole => "journal+console",
        Socket => "socket",
    }
}

string_enum! {
    pub enum UnitFileChangeKind {
        Symlink => "symlink",
        Unlink => "unlink",
    }
}

string_enum! {
    pub enum UnitFileState {
        Enabled => "enabled",
        EnabledRuntime => "enabled-runtime",
        Linked => "linked",
        LinkedRuntime => "linked-runtime",
        Masked => "masked",
        MaskedRuntime => "masked-runtime",
        Static => "static",
        Disabled => "disabled",
        Invalid => "invalid",
    }
}

impl JobType {
    /// Restart-class jobs collapse to reload-class ones when the unit can
    /// reload.
    #[must_use]
    pub fn reload_if_possible(self, can_reload: bool) -> Self {
        match (self, can_reload) {
            (JobType::Restart, true) => JobType::ReloadOrStart,
            (JobType::TryRestart, true) => JobType::Reload,
            (other, _) => other,
        }
    }
}

impl KillWho {
    /// An empty string means every process of the unit.
    #[must_use]
    pub fn parse_or_all(s: &str) -> Option<Self> {
        if s.is_empty() {
            Some(KillWho::All)
        } else {
            s.parse().ok()
        }
    }
}

impl UnitType {
    /// Type of a unit name such as `foo.service`. The prefix must be
    /// non-empty.
    #[must_use]
    pub fn from_unit_name(name: &str) -> Option<Self> {
        let (prefix, suffix) = name.rsplit_once('.')?;
        if prefix.is_empty() {
            return None;
        }
        suffix.parse().ok()
    }

    /// Only services and scopes can be created at runtime.
    #[must_use]
    pub fn can_transient(&self) -> bool {
        matches!(self, UnitType::Service | UnitType::Scope)
    }
}

/// The job currently attached to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub id: u32,
    pub job_type: JobType,
}

/// Snapshot of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub id: String,
    pub description: String,
    pub load_state: LoadState,
    pub active_state: ActiveState,
    pub sub_state: String,
    /// Unit this one follows, if any.
    pub following: Option<String>,
    pub job: Option<JobRef>,
    pub can_reload: bool,
    /// Some other unit references this one.
    pub referenced: bool,
}

impl UnitInfo {
    #[must_use]
    pub fn path(&self) -> ObjectPath {
        unit_path(&self.id)
    }

    #[must_use]
    pub fn unit_type(&self) -> Option<UnitType> {
        UnitType::from_unit_name(&self.id)
    }
}

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: u32,
    pub unit_id: String,
    pub job_type: JobType,
    pub state: JobState,
}

impl JobInfo {
    #[must_use]
    pub fn path(&self) -> ObjectPath {
        job_path(self.id)
    }
}

/// One symlink created or removed by a unit-file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFileChange {
    pub kind: UnitFileChangeKind,
    pub path: String,
    pub source: String,
}

/// A unit file and its enablement state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFileEntry {
    pub path: String,
    pub state: UnitFileState,
}

/// Batch operations on unit files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitFileOperation {
    Enable,
    Reenable,
    Link,
    Preset,
    Mask,
    Disable,
    Unmask,
}

impl UnitFileOperation {
    /// Replies of these operations lead with the carries-install-info flag.
    #[must_use]
    pub fn carries_install_info(&self) -> bool {
        matches!(
            self,
            UnitFileOperation::Enable | UnitFileOperation::Reenable | UnitFileOperation::Preset
        )
    }

    /// Disable and Unmask take no force flag.
    #[must_use]
    pub fn takes_force(&self) -> bool {
        !matches!(self, UnitFileOperation::Disable | UnitFileOperation::Unmask)
    }
}

/// Result of a batch unit-file operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallChanges {
    pub carries_install_info: bool,
    pub changes: Vec<UnitFileChange>,
}

/// Why the manager main loop should leave its current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerExitCode {
    Reload,
    Reexecute,
    Exit,
    Reboot,
    PowerOff,
    Halt,
    KExec,
    SwitchRoot,
}

/// A wall-clock / monotonic timestamp pair in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualTimestamp {
    pub realtime: u64,
    pub monotonic: u64,
}

impl DualTimestamp {
    #[must_use]
    pub fn new(realtime: u64, monotonic: u64) -> Self {
        Self {
            realtime,
            monotonic,
        }
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.realtime > 0 || self.monotonic > 0
    }
}

/// Boot and startup timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerTimestamps {
    pub firmware: DualTimestamp,
    pub loader: DualTimestamp,
    pub kernel: DualTimestamp,
    pub initrd: DualTimestamp,
    pub userspace: DualTimestamp,
    pub finish: DualTimestamp,
    pub security_start: DualTimestamp,
    pub security_finish: DualTimestamp,
    pub generators_start: DualTimestamp,
    pub generators_finish: DualTimestamp,
    pub units_load_start: DualTimestamp,
    pub units_load_finish: DualTimestamp,
}

/// Population counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerCounters {
    /// Unit names, aliases included.
    pub n_names: u32,
    /// Jobs currently queued.
    pub n_jobs: u32,
    /// Jobs ever installed.
    pub n_installed_jobs: u32,
    pub n_failed_jobs: u32,
}

impl ManagerCounters {
    /// Startup progress in `[0, 1]`. Finished startup is always `1.0`; with
    /// no installed jobs yet the ratio is `0.0`.
    #[must_use]
    pub fn progress(&self, finished: bool) -> f64 {
        if finished {
            return 1.0;
        }
        if self.n_installed_jobs == 0 {
            return 0.0;
        }
        1.0 - f64::from(self.n_jobs) / f64::from(self.n_installed_jobs)
    }
}

/// Manager-wide settings exposed as properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    pub confirm_spawn: bool,
    pub show_status: bool,
    pub unit_path: Vec<String>,
    pub default_std_output: ExecOutput,
    pub default_std_error: ExecOutput,
    /// `/usr` lives on a separate file system.
    pub taint_usr: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            confirm_spawn: false,
            show_status: true,
            unit_path: Vec::new(),
            default_std_output: ExecOutput::Journal,
            default_std_error: ExecOutput::Inherit,
            taint_usr: false,
        }
    }
}

/// One auxiliary unit of a transient-unit request: name plus properties.
pub type AuxUnit = (String, Vec<(String, shared_bus::Value)>);
