//! # Dispatch Tests
//!
//! Routing, argument checking, authorization ordering and the unit/job
//! methods of the manager interface.

mod common;

use common::*;
use manager_gateway::domain::error::names;
use manager_gateway::domain::types::{ActiveState, JobType, KillWho, LoadState};
use manager_gateway::ports::{AccessDecision, AccessPolicy, AccessRequest};
use manager_gateway::{AuthorizationGate, CallerIdentity};
use std::sync::Arc;
use proptest::prelude::*;
use shared_bus::{BusConnection, Message, ObjectPath, Value};

// =============================================================================
// ROUTING
// =============================================================================

#[test]
fn test_unknown_object_path() {
    let mut h = Harness::new();
    let root = h.root();
    let call = Message::method_call(
        ObjectPath::root().join_escaped("elsewhere"),
        "org.freedesktop.systemd1.Manager",
        "Dump",
        vec![],
    );
    let (name, _) = fault_of(&h.call(&root, call).unwrap());
    assert_eq!(name, names::UNKNOWN_OBJECT);
}

#[test]
fn test_unknown_method() {
    let mut h = Harness::new();
    let root = h.root();
    let (name, text) = h.fault(&root, "FlyToTheMoon", vec![]);
    assert_eq!(name, names::UNKNOWN_METHOD);
    assert!(text.contains("FlyToTheMoon"));
}

#[test]
fn test_wrong_argument_types_rejected_before_handler() {
    let mut h = Harness::new();
    let root = h.root();
    let (name, text) = h.fault(&root, "StartUnit", vec!["a.service".into(), Value::UInt32(1)]);
    assert_eq!(name, names::INVALID_ARGS);
    assert!(text.starts_with("Invalid arguments to StartUnit"));
    assert!(h.core.lock().jobs.is_empty());
}

#[test]
fn test_access_denied_precedes_mutation() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let user = h.client(":1.7", 1000);

    let (name, text) = h.fault(&user, "StopUnit", vec!["sshd.service".into(), "replace".into()]);
    assert_eq!(name, names::ACCESS_DENIED);
    assert!(text.contains("uid 1000"));
    assert!(h.core.lock().jobs.is_empty());
    assert_eq!(
        h.gateway
            .context()
            .metrics
            .access_denied
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

/// Lets every call through except those naming one unit.
struct DenyUnit(&'static str);

impl AccessPolicy for DenyUnit {
    fn check(&self, _caller: &CallerIdentity, request: &AccessRequest<'_>) -> AccessDecision {
        if request.unit == Some(self.0) {
            AccessDecision::Deny(format!("{} is off limits", self.0))
        } else {
            AccessDecision::Allow
        }
    }
}

#[test]
fn test_per_unit_denial_is_counted() {
    let mut h = Harness::new();
    h.add_unit("secret.service");
    h.add_unit("open.service");
    h.gateway.context_mut().gate = AuthorizationGate::new(Arc::new(DenyUnit("secret.service")));
    let root = h.root();

    let (name, _) = h.fault(&root, "StartUnit", vec!["secret.service".into(), "replace".into()]);
    assert_eq!(name, names::ACCESS_DENIED);
    assert!(h.core.lock().jobs.is_empty());
    h.ok(&root, "StartUnit", vec!["open.service".into(), "replace".into()]);

    assert_eq!(
        h.gateway
            .context()
            .metrics
            .access_denied
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[test]
fn test_status_calls_open_to_unprivileged() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let user = h.client(":1.7", 1000);
    let body = h.ok(&user, "GetUnit", vec!["sshd.service".into()]);
    assert_eq!(
        object_path(&body[0]),
        "/org/freedesktop/systemd1/unit/sshd_2eservice"
    );
}

#[test]
fn test_no_reply_expected_suppresses_reply() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let root = h.root();
    let call = manager_call("StartUnit", vec!["sshd.service".into(), "replace".into()])
        .with_no_reply_expected();
    assert!(h.call(&root, call).is_none());
    assert_eq!(h.core.lock().jobs.len(), 1);
}

// =============================================================================
// UNIT LOOKUP
// =============================================================================

proptest! {
    #[test]
    fn prop_get_unit_of_absent_name_is_no_such_unit(name in "[a-z][a-z0-9-]{0,15}\\.(service|socket|target)") {
        let mut h = Harness::new();
        let root = h.root();
        let (fault, _) = h.fault(&root, "GetUnit", vec![name.as_str().into()]);
        prop_assert_eq!(fault, names::NO_SUCH_UNIT);
    }
}

#[test]
fn test_load_unit_returns_fresh_handle() {
    let mut h = Harness::new();
    let root = h.root();
    let body = h.ok(&root, "LoadUnit", vec!["new.service".into()]);
    assert_eq!(
        object_path(&body[0]),
        "/org/freedesktop/systemd1/unit/new_2eservice"
    );
    assert_eq!(
        h.core.lock().units["new.service"].load_state,
        LoadState::NotFound
    );

    // Now loaded, so GetUnit finds it.
    h.ok(&root, "GetUnit", vec!["new.service".into()]);
}

#[test]
fn test_load_unit_propagates_load_error() {
    let mut h = Harness::new();
    h.core
        .lock()
        .load_failures
        .insert("broken.service".into(), "bad syntax".into());
    let root = h.root();
    let (name, text) = h.fault(&root, "LoadUnit", vec!["broken.service".into()]);
    assert_eq!(name, names::LOAD_FAILED);
    assert!(text.contains("bad syntax"));
}

#[test]
fn test_get_unit_by_pid() {
    let mut h = Harness::new();
    h.add_unit("cron.service");
    h.core.lock().pids.insert(4242, "cron.service".into());
    let root = h.root();

    let body = h.ok(&root, "GetUnitByPID", vec![Value::UInt32(4242)]);
    assert!(object_path(&body[0]).ends_with("cron_2eservice"));

    // 0 means the caller's own pid, which the harness sets to 4242.
    let body = h.ok(&root, "GetUnitByPID", vec![Value::UInt32(0)]);
    assert!(object_path(&body[0]).ends_with("cron_2eservice"));

    let (name, _) = h.fault(&root, "GetUnitByPID", vec![Value::UInt32(9)]);
    assert_eq!(name, names::NO_UNIT_FOR_PID);
}

#[test]
fn test_get_unit_by_pid_zero_without_caller_pid() {
    let mut h = Harness::new();
    let caller = CallerIdentity::new(h.api.id()).with_sender(":1.3").with_uid(0);
    let (name, _) = h.fault(&caller, "GetUnitByPID", vec![Value::UInt32(0)]);
    assert_eq!(name, names::FAILED);
}

// =============================================================================
// JOBS
// =============================================================================

#[test]
fn test_start_unit_queues_job() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let root = h.root();
    let body = h.ok(&root, "StartUnit", vec!["sshd.service".into(), "replace".into()]);
    assert_eq!(object_path(&body[0]), "/org/freedesktop/systemd1/job/1");

    let core = h.core.lock();
    assert_eq!(core.jobs[&1].job_type, JobType::Start);
    assert_eq!(core.units["sshd.service"].job.map(|j| j.id), Some(1));
}

#[test]
fn test_start_unit_invalid_mode() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let root = h.root();
    let (name, text) = h.fault(&root, "StartUnit", vec!["sshd.service".into(), "sideways".into()]);
    assert_eq!(name, names::INVALID_ARGS);
    assert_eq!(text, "Job mode sideways invalid.");
}

#[test]
fn test_reload_or_restart_prefers_reload() {
    let mut h = Harness::new();
    h.core.lock().add_unit("nginx.service").can_reload = true;
    h.add_unit("plain.service");
    let root = h.root();

    h.ok(&root, "ReloadOrRestartUnit", vec!["nginx.service".into(), "replace".into()]);
    h.ok(&root, "ReloadOrRestartUnit", vec!["plain.service".into(), "replace".into()]);
    h.ok(&root, "ReloadOrTryRestartUnit", vec!["nginx.service".into(), "replace".into()]);
    h.ok(&root, "RestartUnit", vec!["nginx.service".into(), "fail".into()]);

    let core = h.core.lock();
    let types: Vec<JobType> = core.jobs.values().map(|j| j.job_type).collect();
    assert_eq!(
        types,
        vec![
            JobType::ReloadOrStart,
            JobType::Restart,
            JobType::Reload,
            JobType::Restart
        ]
    );
}

#[test]
fn test_job_rejection_is_transaction_failed() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    h.core.lock().reject_jobs = true;
    let root = h.root();
    let (name, _) = h.fault(&root, "StartUnit", vec!["sshd.service".into(), "fail".into()]);
    assert_eq!(name, names::TRANSACTION_FAILED);
}

#[test]
fn test_start_unit_replace_requires_start_job_on_old_unit() {
    let mut h = Harness::new();
    h.add_unit("old.service");
    h.add_unit("new.service");
    let root = h.root();

    let (name, text) = h.fault(
        &root,
        "StartUnitReplace",
        vec!["old.service".into(), "new.service".into(), "replace".into()],
    );
    assert_eq!(name, names::NO_SUCH_JOB);
    assert_eq!(text, "No job queued for unit old.service");

    h.ok(&root, "StartUnit", vec!["old.service".into(), "replace".into()]);
    let body = h.ok(
        &root,
        "StartUnitReplace",
        vec!["old.service".into(), "new.service".into(), "replace".into()],
    );
    assert_eq!(object_path(&body[0]), "/org/freedesktop/systemd1/job/2");
}

#[test]
fn test_get_and_cancel_job() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let root = h.root();
    h.ok(&root, "StartUnit", vec!["sshd.service".into(), "replace".into()]);

    let body = h.ok(&root, "GetJob", vec![Value::UInt32(1)]);
    assert_eq!(object_path(&body[0]), "/org/freedesktop/systemd1/job/1");

    h.ok(&root, "CancelJob", vec![Value::UInt32(1)]);
    let (name, text) = h.fault(&root, "GetJob", vec![Value::UInt32(1)]);
    assert_eq!(name, names::NO_SUCH_JOB);
    assert_eq!(text, "Job 1 does not exist.");
}

#[test]
fn test_clear_jobs_and_reset_failed() {
    let mut h = Harness::new();
    h.core.lock().add_unit("bad.service").active_state = ActiveState::Failed;
    let root = h.root();
    h.ok(&root, "StartUnit", vec!["bad.service".into(), "replace".into()]);

    h.ok(&root, "ClearJobs", vec![]);
    h.ok(&root, "ResetFailed", vec![]);

    let core = h.core.lock();
    assert!(core.jobs.is_empty());
    assert!(core.jobs_cleared);
    assert_eq!(core.units["bad.service"].active_state, ActiveState::Inactive);
}

#[test]
fn test_list_units_and_jobs() {
    let mut h = Harness::new();
    h.add_unit("a.service");
    h.add_unit("b.socket");
    let root = h.root();
    h.ok(&root, "StartUnit", vec!["b.socket".into(), "replace".into()]);

    let body = h.ok(&root, "ListUnits", vec![]);
    let rows = body[0].as_array().unwrap();
    assert_eq!(rows.len(), 2);

    let a = rows[0].as_struct().unwrap();
    assert_eq!(a[0].as_str(), Some("a.service"));
    assert_eq!(a[2].as_str(), Some("loaded"));
    assert_eq!(a[7].as_u32(), Some(0));
    assert_eq!(a[8].as_str(), Some(""));
    assert_eq!(object_path(&a[9]), "/");

    let b = rows[1].as_struct().unwrap();
    assert_eq!(b[7].as_u32(), Some(1));
    assert_eq!(b[8].as_str(), Some("start"));
    assert_eq!(object_path(&b[9]), "/org/freedesktop/systemd1/job/1");

    let body = h.ok(&root, "ListJobs", vec![]);
    let jobs = body[0].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    let job = jobs[0].as_struct().unwrap();
    assert_eq!(job[1].as_str(), Some("b.socket"));
    assert_eq!(job[3].as_str(), Some("waiting"));
    assert_eq!(object_path(&job[5]), "/org/freedesktop/systemd1/unit/b_2esocket");
}

#[test]
fn test_dump() {
    let mut h = Harness::new();
    h.add_unit("a.service");
    let root = h.root();
    let body = h.ok(&root, "Dump", vec![]);
    assert!(body[0].as_str().unwrap().contains("a.service"));
}

// =============================================================================
// PER-UNIT OPERATIONS
// =============================================================================

#[test]
fn test_kill_unit_validation() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let root = h.root();

    let (name, text) = h.fault(
        &root,
        "KillUnit",
        vec!["sshd.service".into(), "everyone".into(), Value::Int32(15)],
    );
    assert_eq!(name, names::INVALID_ARGS);
    assert_eq!(text, "Invalid who argument everyone");

    let (_, text) = h.fault(
        &root,
        "KillUnit",
        vec!["sshd.service".into(), "".into(), Value::Int32(0)],
    );
    assert_eq!(text, "Signal number out of range.");

    let (name, _) = h.fault(
        &root,
        "KillUnit",
        vec!["ghost.service".into(), "".into(), Value::Int32(9)],
    );
    assert_eq!(name, names::NO_SUCH_UNIT);

    h.ok(
        &root,
        "KillUnit",
        vec!["sshd.service".into(), "".into(), Value::Int32(9)],
    );
    assert_eq!(
        h.core.lock().killed,
        vec![("sshd.service".to_string(), KillWho::All, 9)]
    );
}

#[test]
fn test_set_unit_properties() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let root = h.root();
    h.ok(
        &root,
        "SetUnitProperties",
        vec![
            "sshd.service".into(),
            true.into(),
            property_array(vec![("CPUShares", Value::UInt64(512))]),
        ],
    );
    let core = h.core.lock();
    let (unit, runtime, props) = &core.unit_properties[0];
    assert_eq!(unit, "sshd.service");
    assert!(*runtime);
    assert_eq!(props, &vec![("CPUShares".to_string(), Value::UInt64(512))]);
}

#[test]
fn test_reset_failed_unit() {
    let mut h = Harness::new();
    h.core.lock().add_unit("bad.service").active_state = ActiveState::Failed;
    let root = h.root();
    h.ok(&root, "ResetFailedUnit", vec!["bad.service".into()]);
    assert_eq!(
        h.core.lock().units["bad.service"].active_state,
        ActiveState::Inactive
    );
}

// =============================================================================
// TRANSIENT UNITS AND SNAPSHOTS
// =============================================================================

fn transient_body(name: &str, mode: &str) -> Vec<Value> {
    vec![
        name.into(),
        mode.into(),
        property_array(vec![("Description", "one-off job".into())]),
        no_aux_units(),
    ]
}

#[test]
fn test_start_transient_unit() {
    let mut h = Harness::new();
    let root = h.root();
    let body = h.ok(&root, "StartTransientUnit", transient_body("run-1.service", "fail"));
    assert_eq!(object_path(&body[0]), "/org/freedesktop/systemd1/job/1");

    let core = h.core.lock();
    assert_eq!(core.units["run-1.service"].description, "one-off job");
    assert!(core.transient.contains_key("run-1.service"));
}

#[test]
fn test_start_transient_unit_rejections() {
    let mut h = Harness::new();
    h.add_unit("taken.service");
    let root = h.root();

    let (name, text) = h.fault(&root, "StartTransientUnit", transient_body("nodot", "fail"));
    assert_eq!(name, names::INVALID_ARGS);
    assert_eq!(text, "Invalid unit type.");

    let (_, text) = h.fault(&root, "StartTransientUnit", transient_body("x.target", "fail"));
    assert_eq!(text, "Unit type target does not support transient units.");

    let (_, text) = h.fault(&root, "StartTransientUnit", transient_body("x.scope", "bogus"));
    assert_eq!(text, "Job mode bogus is invalid.");

    let (name, _) = h.fault(&root, "StartTransientUnit", transient_body("taken.service", "fail"));
    assert_eq!(name, names::UNIT_EXISTS);
    assert!(h.core.lock().transient.is_empty());
}

#[test]
fn test_create_snapshot_generates_name() {
    let mut h = Harness::new();
    let root = h.root();
    let body = h.ok(&root, "CreateSnapshot", vec!["".into(), true.into()]);
    assert_eq!(
        object_path(&body[0]),
        "/org/freedesktop/systemd1/unit/snapshot_2d1_2esnapshot"
    );
    assert!(h.core.lock().cleanup_snapshots.contains("snapshot-1.snapshot"));

    h.ok(&root, "CreateSnapshot", vec!["keep.snapshot".into(), false.into()]);
    assert!(!h.core.lock().cleanup_snapshots.contains("keep.snapshot"));
}

#[test]
fn test_remove_snapshot() {
    let mut h = Harness::new();
    h.add_unit("sshd.service");
    let root = h.root();
    h.ok(&root, "CreateSnapshot", vec!["s.snapshot".into(), false.into()]);

    let (name, text) = h.fault(&root, "RemoveSnapshot", vec!["sshd.service".into()]);
    assert_eq!(name, names::NO_SUCH_UNIT);
    assert_eq!(text, "Unit sshd.service is not a snapshot");

    h.ok(&root, "RemoveSnapshot", vec!["s.snapshot".into()]);
    let (_, text) = h.fault(&root, "RemoveSnapshot", vec!["s.snapshot".into()]);
    assert_eq!(text, "Unit s.snapshot does not exist.");
}
