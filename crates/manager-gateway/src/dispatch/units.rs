//! Unit lookup, job-queueing and per-unit operations.

use super::{parse_job_mode, Args, CallContext, HandlerDescriptor, Reply};
use crate::auth::AccessVerb;
use crate::context::ManagerContext;
use crate::domain::error::{BusFault, FaultKind, FaultResult};
use crate::domain::types::{job_path, JobType, KillWho, LoadState, UnitInfo, UnitType};
use shared_bus::{ObjectPath, Type, Value};
use tracing::{debug, info};

/// Highest valid signal number.
const MAX_SIGNAL: i32 = 64;

pub(super) const HANDLERS: &[HandlerDescriptor] = &[
    HandlerDescriptor::manager("GetUnit", "s", "o", AccessVerb::Status, get_unit),
    HandlerDescriptor::manager("GetUnitByPID", "u", "o", AccessVerb::Status, get_unit_by_pid),
    HandlerDescriptor::manager("LoadUnit", "s", "o", AccessVerb::Status, load_unit),
    HandlerDescriptor::manager("StartUnit", "ss", "o", AccessVerb::Start, start_unit),
    HandlerDescriptor::manager("StartUnitReplace", "sss", "o", AccessVerb::Start, start_unit_replace),
    HandlerDescriptor::manager("StopUnit", "ss", "o", AccessVerb::Stop, stop_unit),
    HandlerDescriptor::manager("ReloadUnit", "ss", "o", AccessVerb::Reload, reload_unit),
    HandlerDescriptor::manager("RestartUnit", "ss", "o", AccessVerb::Start, restart_unit),
    HandlerDescriptor::manager("TryRestartUnit", "ss", "o", AccessVerb::Start, try_restart_unit),
    HandlerDescriptor::manager("ReloadOrRestartUnit", "ss", "o", AccessVerb::Start, reload_or_restart_unit),
    HandlerDescriptor::manager("ReloadOrTryRestartUnit", "ss", "o", AccessVerb::Start, reload_or_try_restart_unit),
    HandlerDescriptor::manager("KillUnit", "ssi", "", AccessVerb::Stop, kill_unit),
    HandlerDescriptor::manager("ResetFailedUnit", "s", "", AccessVerb::Reload, reset_failed_unit),
    HandlerDescriptor::manager("SetUnitProperties", "sba(sv)", "", AccessVerb::Start, set_unit_properties),
    HandlerDescriptor::manager("StartTransientUnit", "ssa(sv)a(sa(sv))", "o", AccessVerb::Start, start_transient_unit),
    HandlerDescriptor::manager("ListUnits", "", "a(ssssssouso)", AccessVerb::Status, list_units),
    HandlerDescriptor::manager("Dump", "", "s", AccessVerb::Status, dump),
    HandlerDescriptor::manager("CreateSnapshot", "sb", "o", AccessVerb::Start, create_snapshot),
    HandlerDescriptor::manager("RemoveSnapshot", "s", "", AccessVerb::Stop, remove_snapshot),
];

fn path_reply(path: ObjectPath) -> Reply {
    Reply::Return(vec![path.into()])
}

/// Look up a loaded unit for an operation on it.
fn loaded_unit(ctx: &ManagerContext, name: &str) -> FaultResult<UnitInfo> {
    ctx.core
        .get_unit(name)
        .ok_or_else(|| BusFault::no_such_unit(format!("Unit {} is not loaded.", name)))
}

fn get_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let unit = ctx
        .core
        .get_unit(name)
        .ok_or_else(|| BusFault::unit_not_loaded(name))?;
    ctx.gate.check_unit(call.caller, AccessVerb::Status, &unit.id)?;
    Ok(path_reply(unit.path()))
}

fn get_unit_by_pid(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let pid = match args.next_u32()? {
        0 => call
            .caller
            .pid
            .ok_or_else(|| BusFault::failed("Could not determine the caller's PID."))?,
        pid => pid,
    };
    let unit = ctx
        .core
        .get_unit_by_pid(pid)
        .ok_or_else(|| BusFault::no_unit_for_pid(pid))?;
    ctx.gate.check_unit(call.caller, AccessVerb::Status, &unit.id)?;
    Ok(path_reply(unit.path()))
}

fn load_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let unit = ctx.core.load_unit(name)?;
    ctx.gate.check_unit(call.caller, AccessVerb::Status, &unit.id)?;
    Ok(path_reply(unit.path()))
}

/// Load `name` and queue a job of `job_type` on it. With
/// `reload_if_possible` restart-class jobs become reloads for units that
/// can reload.
fn start_generic(
    ctx: &mut ManagerContext,
    call: &CallContext<'_>,
    name: &str,
    mode: &str,
    job_type: JobType,
    reload_if_possible: bool,
) -> FaultResult<Reply> {
    let mode = parse_job_mode(mode, |m| format!("Job mode {} invalid.", m))?;
    let unit = ctx.core.load_unit(name)?;

    let job_type = if reload_if_possible {
        job_type.reload_if_possible(unit.can_reload)
    } else {
        job_type
    };
    let verb = match job_type {
        JobType::Stop => AccessVerb::Stop,
        JobType::Reload => AccessVerb::Reload,
        _ => AccessVerb::Start,
    };
    ctx.gate.check_unit(call.caller, verb, &unit.id)?;

    let job = ctx.core.queue_job(&unit.id, job_type, mode)?;
    debug!(
        correlation_id = %call.correlation_id,
        unit = %unit.id,
        job_id = job.id,
        job_type = %job_type,
        mode = %mode,
        "Job queued"
    );
    Ok(path_reply(job.path()))
}

fn start_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let (name, mode) = (args.next_str()?, args.next_str()?);
    start_generic(ctx, call, name, mode, JobType::Start, false)
}

fn stop_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let (name, mode) = (args.next_str()?, args.next_str()?);
    start_generic(ctx, call, name, mode, JobType::Stop, false)
}

fn reload_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let (name, mode) = (args.next_str()?, args.next_str()?);
    start_generic(ctx, call, name, mode, JobType::Reload, false)
}

fn restart_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let (name, mode) = (args.next_str()?, args.next_str()?);
    start_generic(ctx, call, name, mode, JobType::Restart, false)
}

fn try_restart_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let (name, mode) = (args.next_str()?, args.next_str()?);
    start_generic(ctx, call, name, mode, JobType::TryRestart, false)
}

fn reload_or_restart_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let (name, mode) = (args.next_str()?, args.next_str()?);
    start_generic(ctx, call, name, mode, JobType::Restart, true)
}

fn reload_or_try_restart_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let (name, mode) = (args.next_str()?, args.next_str()?);
    start_generic(ctx, call, name, mode, JobType::TryRestart, true)
}

/// Start `new` only if `old` still has a start job queued.
fn start_unit_replace(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let old = args.next_str()?;
    let (name, mode) = (args.next_str()?, args.next_str()?);

    let old_unit = ctx
        .core
        .get_unit(old)
        .ok_or_else(|| BusFault::unit_not_loaded(old))?;
    if !old_unit
        .job
        .is_some_and(|job| job.job_type == JobType::Start)
    {
        return Err(BusFault::new(
            FaultKind::NoSuchJob,
            format!("No job queued for unit {}", old),
        ));
    }

    start_generic(ctx, call, name, mode, JobType::Start, false)
}

fn kill_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let who_arg = args.next_str()?;
    let signal = args.next_i32()?;

    let who = KillWho::parse_or_all(who_arg)
        .ok_or_else(|| BusFault::invalid_args(format!("Invalid who argument {}", who_arg)))?;
    if signal <= 0 || signal > MAX_SIGNAL {
        return Err(BusFault::invalid_args("Signal number out of range."));
    }

    let unit = loaded_unit(ctx, name)?;
    ctx.gate.check_unit(call.caller, AccessVerb::Stop, &unit.id)?;
    ctx.core.kill_unit(&unit.id, who, signal)?;
    info!(unit = %unit.id, who = %who, signal, "Unit killed");
    Ok(Reply::empty())
}

fn reset_failed_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let unit = loaded_unit(ctx, name)?;
    ctx.gate.check_unit(call.caller, AccessVerb::Reload, &unit.id)?;
    ctx.core.reset_failed_unit(&unit.id)?;
    Ok(Reply::empty())
}

fn set_unit_properties(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let runtime = args.next_bool()?;
    let properties = args.next_properties()?;

    let unit = loaded_unit(ctx, name)?;
    ctx.gate.check_unit(call.caller, AccessVerb::Start, &unit.id)?;
    ctx.core.set_unit_properties(&unit.id, runtime, &properties)?;
    Ok(Reply::empty())
}

fn start_transient_unit(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let mode = args.next_str()?;
    let properties = args.next_properties()?;
    let aux = args.next_aux()?;

    let unit_type = UnitType::from_unit_name(name)
        .ok_or_else(|| BusFault::invalid_args("Invalid unit type."))?;
    if !unit_type.can_transient() {
        return Err(BusFault::invalid_args(format!(
            "Unit type {} does not support transient units.",
            unit_type
        )));
    }
    ctx.gate.check_unit(call.caller, AccessVerb::Start, name)?;
    let mode = parse_job_mode(mode, |m| format!("Job mode {} is invalid.", m))?;

    let unit = ctx.core.load_unit(name)?;
    if unit.load_state != LoadState::NotFound || unit.referenced {
        return Err(BusFault::unit_exists(name));
    }

    let unit = ctx.core.make_transient(name, &properties, &aux)?;
    let job = ctx.core.queue_job(&unit.id, JobType::Start, mode)?;
    info!(
        correlation_id = %call.correlation_id,
        unit = %unit.id,
        properties = properties.len(),
        aux_units = aux.len(),
        "Transient unit started"
    );
    Ok(path_reply(job.path()))
}

fn list_units(ctx: &mut ManagerContext, _call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    let element = Type::Struct(vec![
        Type::Str,
        Type::Str,
        Type::Str,
        Type::Str,
        Type::Str,
        Type::Str,
        Type::ObjectPath,
        Type::UInt32,
        Type::Str,
        Type::ObjectPath,
    ]);

    let rows = ctx
        .core
        .list_units()
        .into_iter()
        .map(|unit| {
            let path = unit.path();
            let (job_id, job_type, job_path) = match unit.job {
                Some(job) => (job.id, job.job_type.as_str(), job_path(job.id)),
                None => (0, "", ObjectPath::root()),
            };
            Value::Struct(vec![
                unit.id.into(),
                unit.description.into(),
                unit.load_state.as_str().into(),
                unit.active_state.as_str().into(),
                unit.sub_state.into(),
                unit.following.unwrap_or_default().into(),
                path.into(),
                job_id.into(),
                job_type.into(),
                job_path.into(),
            ])
        })
        .collect();

    Ok(Reply::Return(vec![Value::Array(element, rows)]))
}

fn dump(ctx: &mut ManagerContext, _call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    Ok(Reply::Return(vec![ctx.core.dump().into()]))
}

fn create_snapshot(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let cleanup = args.next_bool()?;
    let name = (!name.is_empty()).then_some(name);

    let unit = ctx.core.create_snapshot(name, cleanup)?;
    info!(
        correlation_id = %call.correlation_id,
        unit = %unit.id,
        cleanup,
        "Snapshot created"
    );
    Ok(path_reply(unit.path()))
}

fn remove_snapshot(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let unit = ctx
        .core
        .get_unit(name)
        .ok_or_else(|| BusFault::no_such_unit(format!("Unit {} does not exist.", name)))?;
    if unit.unit_type() != Some(UnitType::Snapshot) {
        return Err(BusFault::no_such_unit(format!(
            "Unit {} is not a snapshot",
            name
        )));
    }
    ctx.gate.check_unit(call.caller, AccessVerb::Stop, &unit.id)?;
    ctx.core.remove_snapshot(&unit.id)?;
    Ok(Reply::empty())
}
