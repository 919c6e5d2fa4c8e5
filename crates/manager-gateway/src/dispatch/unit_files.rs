//! Unit-file queries and batch operations.
//!
//! A batch that produced changes broadcasts `UnitFilesChanged` before the
//! reply goes out, so a subscriber never sees the reply first.

use super::{Args, CallContext, HandlerDescriptor, Reply};
use crate::auth::AccessVerb;
use crate::broadcast::ManagerSignal;
use crate::context::ManagerContext;
use crate::domain::error::FaultResult;
use crate::domain::types::{InstallChanges, UnitFileChange, UnitFileOperation};
use shared_bus::{Type, Value};
use tracing::{debug, info};

pub(super) const HANDLERS: &[HandlerDescriptor] = &[
    HandlerDescriptor::manager("ListUnitFiles", "", "a(ss)", AccessVerb::Status, list_unit_files),
    HandlerDescriptor::manager("GetUnitFileState", "s", "s", AccessVerb::Status, get_unit_file_state),
    HandlerDescriptor::manager("GetDefaultTarget", "", "s", AccessVerb::Status, get_default_target),
    HandlerDescriptor::manager("SetDefaultTarget", "sb", "a(sss)", AccessVerb::Enable, set_default_target),
    HandlerDescriptor::manager("EnableUnitFiles", "asbb", "ba(sss)", AccessVerb::Enable, enable_unit_files),
    HandlerDescriptor::manager("ReenableUnitFiles", "asbb", "ba(sss)", AccessVerb::Enable, reenable_unit_files),
    HandlerDescriptor::manager("PresetUnitFiles", "asbb", "ba(sss)", AccessVerb::Enable, preset_unit_files),
    HandlerDescriptor::manager("LinkUnitFiles", "asbb", "a(sss)", AccessVerb::Enable, link_unit_files),
    HandlerDescriptor::manager("MaskUnitFiles", "asbb", "a(sss)", AccessVerb::Disable, mask_unit_files),
    HandlerDescriptor::manager("DisableUnitFiles", "asb", "a(sss)", AccessVerb::Disable, disable_unit_files),
    HandlerDescriptor::manager("UnmaskUnitFiles", "asb", "a(sss)", AccessVerb::Enable, unmask_unit_files),
];

fn list_unit_files(ctx: &mut ManagerContext, _call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    let rows = ctx
        .unit_files
        .list(ctx.scope())?
        .into_iter()
        .map(|entry| Value::Struct(vec![entry.path.into(), entry.state.as_str().into()]))
        .collect();
    Ok(Reply::Return(vec![Value::Array(
        Type::Struct(vec![Type::Str, Type::Str]),
        rows,
    )]))
}

fn get_unit_file_state(ctx: &mut ManagerContext, _call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let state = ctx.unit_files.state(ctx.scope(), name)?;
    Ok(Reply::Return(vec![state.as_str().into()]))
}

fn get_default_target(ctx: &mut ManagerContext, _call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    let target = ctx.unit_files.default_target(ctx.scope())?;
    Ok(Reply::Return(vec![target.into()]))
}

fn set_default_target(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let name = args.next_str()?;
    let force = args.next_bool()?;
    let scope = ctx.scope();
    let changes = ctx.unit_files.set_default_target(scope, name, force)?;
    info!(correlation_id = %call.correlation_id, target = name, "Default target set");
    Ok(reply_with_changes(
        ctx,
        InstallChanges {
            carries_install_info: false,
            changes,
        },
        false,
    ))
}

/// `a(sss)` of `(kind, path, source)`.
fn changes_value(changes: Vec<UnitFileChange>) -> Value {
    Value::Array(
        Type::Struct(vec![Type::Str, Type::Str, Type::Str]),
        changes
            .into_iter()
            .map(|c| Value::Struct(vec![c.kind.as_str().into(), c.path.into(), c.source.into()]))
            .collect(),
    )
}

fn reply_with_changes(ctx: &ManagerContext, result: InstallChanges, with_install_info: bool) -> Reply {
    if !result.changes.is_empty() {
        // Delivery problems are logged by the engine; the operation itself succeeded.
        let _ = ctx.broadcast(&ManagerSignal::UnitFilesChanged);
    }

    let mut body = Vec::with_capacity(2);
    if with_install_info {
        body.push(Value::Bool(result.carries_install_info));
    }
    body.push(changes_value(result.changes));
    Reply::Return(body)
}

fn apply(
    ctx: &mut ManagerContext,
    call: &CallContext<'_>,
    args: &mut Args<'_>,
    operation: UnitFileOperation,
) -> FaultResult<Reply> {
    let files = args.next_string_array()?;
    let runtime = args.next_bool()?;
    let force = if operation.takes_force() {
        args.next_bool()?
    } else {
        false
    };

    let result = if files.is_empty() {
        InstallChanges::default()
    } else {
        let scope = ctx.scope();
        ctx.unit_files
            .apply(scope, operation, &files, runtime, force)?
    };

    debug!(
        correlation_id = %call.correlation_id,
        operation = ?operation,
        files = files.len(),
        changes = result.changes.len(),
        runtime,
        force,
        "Unit file operation applied"
    );
    Ok(reply_with_changes(
        ctx,
        result,
        operation.carries_install_info(),
    ))
}

fn enable_unit_files(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    apply(ctx, call, args, UnitFileOperation::Enable)
}

fn reenable_unit_files(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    apply(ctx, call, args, UnitFileOperation::Reenable)
}

fn preset_unit_files(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    apply(ctx, call, args, UnitFileOperation::Preset)
}

fn link_unit_files(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    apply(ctx, call, args, UnitFileOperation::Link)
}

fn mask_unit_files(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    apply(ctx, call, args, UnitFileOperation::Mask)
}

fn disable_unit_files(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    apply(ctx, call, args, UnitFileOperation::Disable)
}

fn unmask_unit_files(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    apply(ctx, call, args, UnitFileOperation::Unmask)
}
