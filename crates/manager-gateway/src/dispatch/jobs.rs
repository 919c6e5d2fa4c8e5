//! Job lookup and bulk job/failure operations.

use super::{Args, CallContext, HandlerDescriptor, Reply};
use crate::auth::AccessVerb;
use crate::context::ManagerContext;
use crate::domain::error::{BusFault, FaultResult};
use crate::domain::types::{unit_path, JobInfo};
use shared_bus::{Type, Value};
use tracing::info;

pub(super) const HANDLERS: &[HandlerDescriptor] = &[
    HandlerDescriptor::manager("GetJob", "u", "o", AccessVerb::Status, get_job),
    HandlerDescriptor::manager("CancelJob", "u", "", AccessVerb::Stop, cancel_job),
    HandlerDescriptor::manager("ClearJobs", "", "", AccessVerb::Reboot, clear_jobs),
    HandlerDescriptor::manager("ResetFailed", "", "", AccessVerb::Reload, reset_failed),
    HandlerDescriptor::manager("ListJobs", "", "a(usssoo)", AccessVerb::Status, list_jobs),
];

fn existing_job(ctx: &ManagerContext, id: u32) -> FaultResult<JobInfo> {
    ctx.core.get_job(id).ok_or_else(|| BusFault::no_such_job(id))
}

fn get_job(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let job = existing_job(ctx, args.next_u32()?)?;
    ctx.gate.check_unit(call.caller, AccessVerb::Status, &job.unit_id)?;
    Ok(Reply::Return(vec![job.path().into()]))
}

fn cancel_job(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let job = existing_job(ctx, args.next_u32()?)?;
    ctx.gate.check_unit(call.caller, AccessVerb::Stop, &job.unit_id)?;
    ctx.core.cancel_job(job.id)?;
    info!(
        correlation_id = %call.correlation_id,
        job_id = job.id,
        unit = %job.unit_id,
        "Job canceled"
    );
    Ok(Reply::empty())
}

fn clear_jobs(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    ctx.core.clear_jobs();
    info!(correlation_id = %call.correlation_id, "Job queue cleared");
    Ok(Reply::empty())
}

fn reset_failed(ctx: &mut ManagerContext, _call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    ctx.core.reset_failed();
    Ok(Reply::empty())
}

fn list_jobs(ctx: &mut ManagerContext, _call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    let element = Type::Struct(vec![
        Type::UInt32,
        Type::Str,
        Type::Str,
        Type::Str,
        Type::ObjectPath,
        Type::ObjectPath,
    ]);

    let rows = ctx
        .core
        .list_jobs()
        .into_iter()
        .map(|job| {
            let path = job.path();
            let unit = unit_path(&job.unit_id);
            Value::Struct(vec![
                job.id.into(),
                job.unit_id.into(),
                job.job_type.as_str().into(),
                job.state.as_str().into(),
                path.into(),
                unit.into(),
            ])
        })
        .collect();

    Ok(Reply::Return(vec![Value::Array(element, rows)]))
}
