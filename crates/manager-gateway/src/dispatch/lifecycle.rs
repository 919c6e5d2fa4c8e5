//! Manager lifecycle transitions.
//!
//! Each handler only records the requested exit code with the core; the
//! main loop acts on it after the current iteration. Reload is the one
//! transition whose reply waits, held by the deferred reply tracker until
//! the reload has finished.

use super::{Args, CallContext, HandlerDescriptor, Reply};
use crate::auth::AccessVerb;
use crate::context::ManagerContext;
use crate::domain::error::{BusFault, FaultResult};
use crate::domain::types::{ManagerExitCode, RunningScope};
use std::path::{Component, Path};
use tracing::info;

pub(super) const HANDLERS: &[HandlerDescriptor] = &[
    HandlerDescriptor::manager("Reload", "", "", AccessVerb::Reload, reload),
    HandlerDescriptor::manager("Reexecute", "", "", AccessVerb::Reload, reexecute),
    HandlerDescriptor::manager("Exit", "", "", AccessVerb::Halt, exit),
    HandlerDescriptor::manager("Reboot", "", "", AccessVerb::Reboot, reboot),
    HandlerDescriptor::manager("PowerOff", "", "", AccessVerb::Halt, power_off),
    HandlerDescriptor::manager("Halt", "", "", AccessVerb::Halt, halt),
    HandlerDescriptor::manager("KExec", "", "", AccessVerb::Reboot, kexec),
    HandlerDescriptor::manager("SwitchRoot", "ss", "", AccessVerb::Reboot, switch_root),
];

fn require_system(ctx: &ManagerContext, message: &str) -> FaultResult<()> {
    if ctx.scope() == RunningScope::System {
        Ok(())
    } else {
        Err(BusFault::not_supported(message))
    }
}

fn request(ctx: &mut ManagerContext, call: &CallContext<'_>, code: ManagerExitCode) {
    info!(
        correlation_id = %call.correlation_id,
        exit_code = ?code,
        "Manager exit requested"
    );
    ctx.core.request_exit(code);
}

fn reload(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    ctx.deferred
        .begin(call.message, call.caller.connection, call.correlation_id)?;
    request(ctx, call, ManagerExitCode::Reload);
    Ok(Reply::Deferred)
}

/// The process image is replaced; nobody would be left to send a reply.
fn reexecute(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    request(ctx, call, ManagerExitCode::Reexecute);
    Ok(Reply::None)
}

fn exit(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    if ctx.scope() == RunningScope::System {
        return Err(BusFault::not_supported(
            "Exit is only supported for user service managers.",
        ));
    }
    request(ctx, call, ManagerExitCode::Exit);
    Ok(Reply::empty())
}

fn reboot(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    require_system(ctx, "Reboot is only supported for system managers.")?;
    request(ctx, call, ManagerExitCode::Reboot);
    Ok(Reply::empty())
}

fn power_off(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    require_system(ctx, "Powering off is only supported for system managers.")?;
    request(ctx, call, ManagerExitCode::PowerOff);
    Ok(Reply::empty())
}

fn halt(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    require_system(ctx, "Halt is only supported for system managers.")?;
    request(ctx, call, ManagerExitCode::Halt);
    Ok(Reply::empty())
}

fn kexec(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    require_system(ctx, "KExec is only supported for system managers.")?;
    request(ctx, call, ManagerExitCode::KExec);
    Ok(Reply::empty())
}

fn switch_root(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let root = args.next_str()?;
    let init = args.next_str()?;

    require_system(ctx, "Switching root is only supported for system managers.")?;

    let root_path = Path::new(root);
    let names_root = root_path
        .components()
        .all(|c| matches!(c, Component::RootDir | Component::CurDir));
    if names_root || !root_path.is_absolute() {
        return Err(BusFault::invalid_args(format!(
            "Invalid switch root path {}",
            root
        )));
    }

    if init.is_empty() {
        if !ctx.probe.is_os_tree(root_path) {
            return Err(BusFault::invalid_args(format!(
                "Specified switch root path {} does not seem to be an OS tree. /etc/os-release is missing.",
                root
            )));
        }
    } else {
        if !Path::new(init).is_absolute() {
            return Err(BusFault::invalid_args(format!("Invalid init path {}", init)));
        }
        let binary = root_path.join(init.trim_start_matches('/'));
        if !ctx.probe.is_executable(&binary) {
            return Err(BusFault::invalid_args(format!(
                "Specified init binary {} does not exist.",
                binary.display()
            )));
        }
    }

    ctx.core
        .set_switch_root(root, (!init.is_empty()).then_some(init));
    request(ctx, call, ManagerExitCode::SwitchRoot);
    Ok(Reply::empty())
}
