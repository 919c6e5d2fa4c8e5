//! Shared fixtures for the gateway integration tests.
//!
//! `InMemoryCore` and `InMemoryUnitFiles` keep their state behind an
//! `Arc<Mutex<_>>` so a test can keep a handle and inspect what the gateway
//! asked the collaborators to do.

#![allow(dead_code)]

use manager_gateway::domain::types::{
    ActiveState, AuxUnit, DualTimestamp, InstallChanges, JobInfo, JobMode, JobRef, JobState,
    JobType, KillWho, LoadState, ManagerCounters, ManagerExitCode, ManagerSettings,
    ManagerTimestamps, RunningScope, UnitFileChange, UnitFileChangeKind, UnitFileEntry,
    UnitFileOperation, UnitFileState, UnitInfo, UnitType, MANAGER_INTERFACE,
};
use manager_gateway::ports::{
    CoreError, InstallError, SupervisorCore, SystemProbe, UnitFileStore,
};
use manager_gateway::{CallerIdentity, GatewayConfig, ManagerContext, ManagerGateway};
use parking_lot::Mutex;
use shared_bus::{
    channel_connection, BusConnection, ChannelConnection, ConnectionId, Message, ObjectPath,
    SendError, Type, Value, PROPERTIES_INTERFACE,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

// =============================================================================
// SUPERVISOR CORE
// =============================================================================

#[derive(Debug)]
pub struct CoreState {
    pub units: BTreeMap<String, UnitInfo>,
    pub pids: BTreeMap<u32, String>,
    pub jobs: BTreeMap<u32, JobInfo>,
    pub next_job: u32,
    /// Unit names that have a file on disk and load as `loaded`.
    pub unit_files: BTreeSet<String>,
    /// Names whose load fails with the given reason.
    pub load_failures: BTreeMap<String, String>,
    pub reject_jobs: bool,
    pub exit_requests: Vec<ManagerExitCode>,
    pub switch_root: Option<(String, Option<String>)>,
    pub environment: Vec<String>,
    pub installed_jobs: u32,
    pub failed_jobs: u32,
    pub timestamps: ManagerTimestamps,
    pub settings: ManagerSettings,
    pub runtime_watchdog_usec: u64,
    pub shutdown_watchdog_usec: u64,
    pub watchdog_fails: bool,
    pub snapshot_seq: u32,
    pub cleanup_snapshots: BTreeSet<String>,
    pub transient: BTreeMap<String, Vec<(String, Value)>>,
    pub killed: Vec<(String, KillWho, i32)>,
    pub unit_properties: Vec<(String, bool, Vec<(String, Value)>)>,
    pub jobs_cleared: bool,
    pub failed_reset: bool,
}

impl Default for CoreState {
    fn default() -> Self {
        Self {
            units: BTreeMap::new(),
            pids: BTreeMap::new(),
            jobs: BTreeMap::new(),
            next_job: 1,
            unit_files: BTreeSet::new(),
            load_failures: BTreeMap::new(),
            reject_jobs: false,
            exit_requests: Vec::new(),
            switch_root: None,
            environment: vec!["PATH=/usr/bin:/bin".to_string(), "LANG=C".to_string()],
            installed_jobs: 0,
            failed_jobs: 0,
            timestamps: ManagerTimestamps::default(),
            settings: ManagerSettings::default(),
            runtime_watchdog_usec: 0,
            shutdown_watchdog_usec: 600_000_000,
            watchdog_fails: false,
            snapshot_seq: 0,
            cleanup_snapshots: BTreeSet::new(),
            transient: BTreeMap::new(),
            killed: Vec::new(),
            unit_properties: Vec::new(),
            jobs_cleared: false,
            failed_reset: false,
        }
    }
}

impl CoreState {
    /// Insert a loaded, active unit.
    pub fn add_unit(&mut self, id: &str) -> &mut UnitInfo {
        self.unit_files.insert(id.to_string());
        self.units
            .entry(id.to_string())
            .or_insert_with(|| loaded_unit(id))
    }
}

pub fn loaded_unit(id: &str) -> UnitInfo {
    UnitInfo {
        id: id.to_string(),
        description: format!("{} unit", id),
        load_state: LoadState::Loaded,
        active_state: ActiveState::Active,
        sub_state: "running".to_string(),
        following: None,
        job: None,
        can_reload: false,
        referenced: false,
    }
}

/// Supervisor core double with inspectable state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCore {
    pub state: Arc<Mutex<CoreState>>,
}

impl SupervisorCore for InMemoryCore {
    fn get_unit(&self, name: &str) -> Option<UnitInfo> {
        self.state.lock().units.get(name).cloned()
    }

    fn get_unit_by_pid(&self, pid: u32) -> Option<UnitInfo> {
        let state = self.state.lock();
        let id = state.pids.get(&pid)?;
        state.units.get(id).cloned()
    }

    fn load_unit(&mut self, name: &str) -> Result<UnitInfo, CoreError> {
        let mut state = self.state.lock();
        if let Some(unit) = state.units.get(name) {
            return Ok(unit.clone());
        }
        if let Some(reason) = state.load_failures.get(name) {
            return Err(CoreError::LoadFailed {
                unit: name.to_string(),
                reason: reason.clone(),
            });
        }
        if UnitType::from_unit_name(name).is_none() {
            return Err(CoreError::InvalidArgument(format!(
                "Unit name {} is not valid.",
                name
            )));
        }

        let mut unit = loaded_unit(name);
        if !state.unit_files.contains(name) {
            unit.load_state = LoadState::NotFound;
            unit.active_state = ActiveState::Inactive;
            unit.sub_state = "dead".to_string();
        }
        state.units.insert(name.to_string(), unit.clone());
        Ok(unit)
    }

    fn queue_job(&mut self, unit: &str, job_type: JobType, _mode: JobMode) -> Result<JobInfo, CoreError> {
        let mut state = self.state.lock();
        if state.reject_jobs {
            return Err(CoreError::JobRejected {
                unit: unit.to_string(),
                reason: "conflicting job queued".to_string(),
            });
        }
        let id = state.next_job;
        state.next_job += 1;
        state.installed_jobs += 1;
        let job = JobInfo {
            id,
            unit_id: unit.to_string(),
            job_type,
            state: JobState::Waiting,
        };
        state.jobs.insert(id, job.clone());
        if let Some(u) = state.units.get_mut(unit) {
            u.job = Some(JobRef { id, job_type });
        }
        Ok(job)
    }

    fn get_job(&self, id: u32) -> Option<JobInfo> {
        self.state.lock().jobs.get(&id).cloned()
    }

    fn cancel_job(&mut self, id: u32) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let job = state.jobs.remove(&id).ok_or(CoreError::NoSuchJob(id))?;
        if let Some(unit) = state.units.get_mut(&job.unit_id) {
            unit.job = None;
        }
        Ok(())
    }

    fn clear_jobs(&mut self) {
        let mut state = self.state.lock();
        state.jobs.clear();
        for unit in state.units.values_mut() {
            unit.job = None;
        }
        state.jobs_cleared = true;
    }

    fn reset_failed(&mut self) {
        let mut state = self.state.lock();
        for unit in state.units.values_mut() {
            if unit.active_state == ActiveState::Failed {
                unit.active_state = ActiveState::Inactive;
            }
        }
        state.failed_reset = true;
    }

    fn reset_failed_unit(&mut self, unit: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let unit = state
            .units
            .get_mut(unit)
            .ok_or_else(|| CoreError::NoSuchUnit(unit.to_string()))?;
        if unit.active_state == ActiveState::Failed {
            unit.active_state = ActiveState::Inactive;
        }
        Ok(())
    }

    fn kill_unit(&mut self, unit: &str, who: KillWho, signal: i32) -> Result<(), CoreError> {
        self.state.lock().killed.push((unit.to_string(), who, signal));
        Ok(())
    }

    fn set_unit_properties(
        &mut self,
        unit: &str,
        runtime: bool,
        properties: &[(String, Value)],
    ) -> Result<(), CoreError> {
        self.state
            .lock()
            .unit_properties
            .push((unit.to_string(), runtime, properties.to_vec()));
        Ok(())
    }

    fn make_transient(
        &mut self,
        unit: &str,
        properties: &[(String, Value)],
        _aux: &[AuxUnit],
    ) -> Result<UnitInfo, CoreError> {
        let mut state = self.state.lock();
        state
            .transient
            .insert(unit.to_string(), properties.to_vec());
        let mut info = loaded_unit(unit);
        if let Some(description) = properties
            .iter()
            .find(|(name, _)| name == "Description")
            .and_then(|(_, value)| value.as_str())
        {
            info.description = description.to_string();
        }
        state.units.insert(unit.to_string(), info.clone());
        Ok(info)
    }

    fn list_units(&self) -> Vec<UnitInfo> {
        self.state.lock().units.values().cloned().collect()
    }

    fn list_jobs(&self) -> Vec<JobInfo> {
        self.state.lock().jobs.values().cloned().collect()
    }

    fn dump(&self) -> String {
        let state = self.state.lock();
        state
            .units
            .values()
            .map(|u| format!("-> Unit {}:\n\tLoad State: {}\n", u.id, u.load_state))
            .collect()
    }

    fn create_snapshot(&mut self, name: Option<&str>, cleanup: bool) -> Result<UnitInfo, CoreError> {
        let mut state = self.state.lock();
        let id = match name {
            Some(name) => {
                if UnitType::from_unit_name(name) != Some(UnitType::Snapshot) {
                    return Err(CoreError::InvalidArgument(
                        "Unit name does not end with .snapshot".to_string(),
                    ));
                }
                name.to_string()
            }
            None => {
                state.snapshot_seq += 1;
                format!("snapshot-{}.snapshot", state.snapshot_seq)
            }
        };
        if state.units.contains_key(&id) {
            return Err(CoreError::UnitExists(id));
        }
        let unit = loaded_unit(&id);
        state.units.insert(id.clone(), unit.clone());
        if cleanup {
            state.cleanup_snapshots.insert(id);
        }
        Ok(unit)
    }

    fn remove_snapshot(&mut self, name: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        state
            .units
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CoreError::NoSuchUnit(name.to_string()))
    }

    fn request_exit(&mut self, code: ManagerExitCode) {
        self.state.lock().exit_requests.push(code);
    }

    fn set_switch_root(&mut self, root: &str, init: Option<&str>) {
        self.state.lock().switch_root = Some((root.to_string(), init.map(str::to_string)));
    }

    fn environment(&self) -> Vec<String> {
        self.state.lock().environment.clone()
    }

    fn set_environment(&mut self, environment: Vec<String>) {
        self.state.lock().environment = environment;
    }

    fn counters(&self) -> ManagerCounters {
        let state = self.state.lock();
        ManagerCounters {
            n_names: state.units.len() as u32,
            n_jobs: state.jobs.len() as u32,
            n_installed_jobs: state.installed_jobs,
            n_failed_jobs: state.failed_jobs,
        }
    }

    fn timestamps(&self) -> ManagerTimestamps {
        self.state.lock().timestamps
    }

    fn settings(&self) -> ManagerSettings {
        self.state.lock().settings.clone()
    }

    fn runtime_watchdog_usec(&self) -> u64 {
        self.state.lock().runtime_watchdog_usec
    }

    fn set_runtime_watchdog_usec(&mut self, usec: u64) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if state.watchdog_fails {
            return Err(CoreError::Other("Failed to arm hardware watchdog.".to_string()));
        }
        state.runtime_watchdog_usec = usec;
        Ok(())
    }

    fn shutdown_watchdog_usec(&self) -> u64 {
        self.state.lock().shutdown_watchdog_usec
    }

    fn set_shutdown_watchdog_usec(&mut self, usec: u64) {
        self.state.lock().shutdown_watchdog_usec = usec;
    }
}

// =============================================================================
// UNIT FILES
// =============================================================================

#[derive(Debug)]
pub struct FileState {
    pub files: BTreeMap<String, UnitFileState>,
    pub default_target: String,
    pub apply_calls: usize,
}

impl Default for FileState {
    fn default() -> Self {
        let files = [
            ("sshd.service", UnitFileState::Disabled),
            ("cron.service", UnitFileState::Enabled),
            ("multi-user.target", UnitFileState::Static),
            ("graphical.target", UnitFileState::Static),
        ]
        .into_iter()
        .map(|(name, state)| (name.to_string(), state))
        .collect();
        Self {
            files,
            default_target: "multi-user.target".to_string(),
            apply_calls: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryUnitFiles {
    pub state: Arc<Mutex<FileState>>,
}

fn config_dir(runtime: bool) -> &'static str {
    if runtime {
        "/run/systemd/system"
    } else {
        "/etc/systemd/system"
    }
}

fn change(kind: UnitFileChangeKind, path: String, source: &str) -> UnitFileChange {
    UnitFileChange {
        kind,
        path,
        source: source.to_string(),
    }
}

impl UnitFileStore for InMemoryUnitFiles {
    fn list(&self, _scope: RunningScope) -> Result<Vec<UnitFileEntry>, InstallError> {
        Ok(self
            .state
            .lock()
            .files
            .iter()
            .map(|(name, state)| UnitFileEntry {
                path: format!("/usr/lib/systemd/system/{}", name),
                state: *state,
            })
            .collect())
    }

    fn state(&self, _scope: RunningScope, name: &str) -> Result<UnitFileState, InstallError> {
        self.state
            .lock()
            .files
            .get(name)
            .copied()
            .ok_or_else(|| InstallError::NotFound(name.to_string()))
    }

    fn default_target(&self, _scope: RunningScope) -> Result<String, InstallError> {
        Ok(self.state.lock().default_target.clone())
    }

    fn set_default_target(
        &mut self,
        _scope: RunningScope,
        name: &str,
        _force: bool,
    ) -> Result<Vec<UnitFileChange>, InstallError> {
        let mut state = self.state.lock();
        if !state.files.contains_key(name) {
            return Err(InstallError::NotFound(name.to_string()));
        }
        let link = "/etc/systemd/system/default.target".to_string();
        let source = format!("/usr/lib/systemd/system/{}", name);
        state.default_target = name.to_string();
        Ok(vec![
            change(UnitFileChangeKind::Unlink, link.clone(), ""),
            change(UnitFileChangeKind::Symlink, link, &source),
        ])
    }

    fn apply(
        &mut self,
        _scope: RunningScope,
        operation: UnitFileOperation,
        files: &[String],
        runtime: bool,
        _force: bool,
    ) -> Result<InstallChanges, InstallError> {
        let mut state = self.state.lock();
        state.apply_calls += 1;
        if let Some(missing) = files.iter().find(|f| !state.files.contains_key(f.as_str())) {
            return Err(InstallError::NotFound(missing.clone()));
        }

        let dir = config_dir(runtime);
        let mut result = InstallChanges {
            carries_install_info: operation.carries_install_info(),
            changes: Vec::new(),
        };
        for file in files {
            let source = format!("/usr/lib/systemd/system/{}", file);
            let wants = format!("{}/multi-user.target.wants/{}", dir, file);
            let current = state.files.get(file).copied();
            let (next, changes) = match operation {
                UnitFileOperation::Enable | UnitFileOperation::Preset => {
                    if current == Some(UnitFileState::Enabled) {
                        continue;
                    }
                    (
                        UnitFileState::Enabled,
                        vec![change(UnitFileChangeKind::Symlink, wants, &source)],
                    )
                }
                UnitFileOperation::Reenable => (
                    UnitFileState::Enabled,
                    vec![
                        change(UnitFileChangeKind::Unlink, wants.clone(), ""),
                        change(UnitFileChangeKind::Symlink, wants, &source),
                    ],
                ),
                UnitFileOperation::Disable => {
                    if current != Some(UnitFileState::Enabled) {
                        continue;
                    }
                    (
                        UnitFileState::Disabled,
                        vec![change(UnitFileChangeKind::Unlink, wants, "")],
                    )
                }
                UnitFileOperation::Link => (
                    UnitFileState::Linked,
                    vec![change(
                        UnitFileChangeKind::Symlink,
                        format!("{}/{}", dir, file),
                        &source,
                    )],
                ),
                UnitFileOperation::Mask => (
                    UnitFileState::Masked,
                    vec![change(
                        UnitFileChangeKind::Symlink,
                        format!("{}/{}", dir, file),
                        "/dev/null",
                    )],
                ),
                UnitFileOperation::Unmask => {
                    if current != Some(UnitFileState::Masked) {
                        continue;
                    }
                    (
                        UnitFileState::Disabled,
                        vec![change(
                            UnitFileChangeKind::Unlink,
                            format!("{}/{}", dir, file),
                            "",
                        )],
                    )
                }
            };
            state.files.insert(file.clone(), next);
            result.changes.extend(changes);
        }
        Ok(result)
    }
}

// =============================================================================
// HOST PROBE
// =============================================================================

#[derive(Debug, Clone)]
pub struct FakeProbe {
    pub virtualization: String,
    pub mtab_is_symlink: bool,
    pub cgroups_available: bool,
    pub hwclock_is_localtime: bool,
    pub os_trees: Vec<PathBuf>,
    pub executables: Vec<PathBuf>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            virtualization: String::new(),
            mtab_is_symlink: true,
            cgroups_available: true,
            hwclock_is_localtime: false,
            os_trees: Vec::new(),
            executables: Vec::new(),
        }
    }
}

impl SystemProbe for FakeProbe {
    fn virtualization(&self) -> String {
        self.virtualization.clone()
    }

    fn mtab_is_symlink(&self) -> bool {
        self.mtab_is_symlink
    }

    fn cgroups_available(&self) -> bool {
        self.cgroups_available
    }

    fn hwclock_is_localtime(&self) -> bool {
        self.hwclock_is_localtime
    }

    fn is_os_tree(&self, root: &Path) -> bool {
        self.os_trees.iter().any(|p| p == root)
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.executables.iter().any(|p| p == path)
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Connection whose every send is refused.
#[derive(Debug)]
pub struct FailingConnection {
    id: ConnectionId,
}

impl FailingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
        })
    }
}

impl BusConnection for FailingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, _message: Message) -> Result<(), SendError> {
        Err(SendError::Rejected("queue full".to_string()))
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// Every message currently queued on a channel connection.
pub fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

// =============================================================================
// MESSAGES
// =============================================================================

pub fn manager_path() -> ObjectPath {
    manager_gateway::domain::types::manager_path()
}

pub fn manager_call(member: &str, body: Vec<Value>) -> Message {
    Message::method_call(manager_path(), MANAGER_INTERFACE, member, body)
}

pub fn properties_call(member: &str, body: Vec<Value>) -> Message {
    Message::method_call(manager_path(), PROPERTIES_INTERFACE, member, body)
}

/// `a(sv)` from name/value pairs.
pub fn property_array(entries: Vec<(&str, Value)>) -> Value {
    Value::Array(
        Type::Struct(vec![Type::Str, Type::Variant]),
        entries
            .into_iter()
            .map(|(name, value)| Value::Struct(vec![name.into(), Value::variant(value)]))
            .collect(),
    )
}

/// Empty `a(sa(sv))`.
pub fn no_aux_units() -> Value {
    Value::Array(
        Type::Struct(vec![
            Type::Str,
            Type::array_of(Type::Struct(vec![Type::Str, Type::Variant])),
        ]),
        Vec::new(),
    )
}

pub fn str_array(items: &[&str]) -> Value {
    Value::string_array(items.iter().copied())
}

// =============================================================================
// HARNESS
// =============================================================================

/// A gateway on top of the in-memory collaborators, with one shared bus
/// connection attached.
pub struct Harness {
    pub gateway: ManagerGateway,
    pub core: Arc<Mutex<CoreState>>,
    pub files: Arc<Mutex<FileState>>,
    pub api: Arc<ChannelConnection>,
    pub api_rx: UnboundedReceiver<Message>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(GatewayConfig::default(), FakeProbe::default())
    }

    pub fn with_scope(scope: RunningScope) -> Self {
        let mut config = GatewayConfig::default();
        config.manager.scope = scope;
        Self::with(config, FakeProbe::default())
    }

    pub fn with_probe(probe: FakeProbe) -> Self {
        Self::with(GatewayConfig::default(), probe)
    }

    pub fn with(config: GatewayConfig, probe: FakeProbe) -> Self {
        let core = InMemoryCore::default();
        let files = InMemoryUnitFiles::default();
        let (core_state, file_state) = (Arc::clone(&core.state), Arc::clone(&files.state));

        let ctx = ManagerContext::new(config, Box::new(core), Box::new(files))
            .expect("valid config")
            .with_probe(Arc::new(probe));
        let mut gateway = ManagerGateway::new(ctx).expect("dispatch table");

        let (api, api_rx) = channel_connection();
        gateway.attach_api_connection(api.clone());

        Self {
            gateway,
            core: core_state,
            files: file_state,
            api,
            api_rx,
        }
    }

    /// Privileged client on the shared bus.
    pub fn root(&self) -> CallerIdentity {
        self.client(":1.1", 0)
    }

    /// Client on the shared bus with the given unique name and uid.
    pub fn client(&self, name: &str, uid: u32) -> CallerIdentity {
        CallerIdentity::new(self.api.id())
            .with_sender(name)
            .with_uid(uid)
            .with_pid(4242)
    }

    /// Add a private connection and return it with its receiving end.
    pub fn open_private(&mut self) -> (Arc<ChannelConnection>, UnboundedReceiver<Message>) {
        let (conn, rx) = channel_connection();
        self.gateway.on_connection_opened(conn.clone());
        (conn, rx)
    }

    /// Dispatch `message` as `caller`, returning whatever would be sent back.
    pub fn call(&mut self, caller: &CallerIdentity, message: Message) -> Option<Message> {
        let message = match &caller.sender {
            Some(sender) => message.with_sender(sender.clone()),
            None => message,
        };
        self.gateway.handle_call(&message, caller)
    }

    /// Manager method that must succeed; returns the reply body.
    pub fn ok(&mut self, caller: &CallerIdentity, member: &str, body: Vec<Value>) -> Vec<Value> {
        let reply = self
            .call(caller, manager_call(member, body))
            .unwrap_or_else(|| panic!("{} sent no reply", member));
        assert!(
            reply.is_method_return(),
            "{} failed: {:?} {:?}",
            member,
            reply.error_name(),
            reply.first_str()
        );
        reply.body
    }

    /// Manager method that must fail; returns `(error name, message)`.
    pub fn fault(&mut self, caller: &CallerIdentity, member: &str, body: Vec<Value>) -> (String, String) {
        let reply = self
            .call(caller, manager_call(member, body))
            .unwrap_or_else(|| panic!("{} sent no reply", member));
        fault_of(&reply)
    }

    pub fn add_unit(&self, id: &str) {
        self.core.lock().add_unit(id);
    }
}

/// `(error name, message)` of an error reply.
pub fn fault_of(reply: &Message) -> (String, String) {
    assert!(reply.is_error(), "expected an error reply, got {:?}", reply.kind);
    (
        reply.error_name().unwrap_or_default().to_string(),
        reply.first_str().unwrap_or_default().to_string(),
    )
}

pub fn object_path(value: &Value) -> String {
    value
        .as_object_path()
        .map(|p| p.as_str().to_string())
        .expect("object path")
}

pub fn dual(realtime: u64, monotonic: u64) -> DualTimestamp {
    DualTimestamp::new(realtime, monotonic)
}
