//! Manager environment block edits. Lists are validated whole before the
//! block changes.

use super::{Args, CallContext, HandlerDescriptor, Reply};
use crate::auth::AccessVerb;
use crate::context::ManagerContext;
use crate::domain::env;
use crate::domain::error::{BusFault, FaultResult};
use tracing::debug;

pub(super) const HANDLERS: &[HandlerDescriptor] = &[
    HandlerDescriptor::manager("SetEnvironment", "as", "", AccessVerb::Reload, set_environment),
    HandlerDescriptor::manager("UnsetEnvironment", "as", "", AccessVerb::Reload, unset_environment),
    HandlerDescriptor::manager("UnsetAndSetEnvironment", "asas", "", AccessVerb::Reload, unset_and_set_environment),
];

fn check_plus(plus: &[String]) -> FaultResult<()> {
    if env::assignments_are_valid(plus) {
        Ok(())
    } else {
        Err(BusFault::invalid_args("Invalid environment assignments"))
    }
}

fn check_minus(minus: &[String]) -> FaultResult<()> {
    if env::names_or_assignments_are_valid(minus) {
        Ok(())
    } else {
        Err(BusFault::invalid_args(
            "Invalid environment variable names or assignments",
        ))
    }
}

fn update(ctx: &mut ManagerContext, call: &CallContext<'_>, minus: &[String], plus: &[String]) {
    let current = ctx.core.environment();
    let next = env::apply(&current, minus, plus);
    debug!(
        correlation_id = %call.correlation_id,
        before = current.len(),
        after = next.len(),
        "Manager environment updated"
    );
    ctx.core.set_environment(next);
}

fn set_environment(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let plus = args.next_string_array()?;
    check_plus(&plus)?;
    update(ctx, call, &[], &plus);
    Ok(Reply::empty())
}

fn unset_environment(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let minus = args.next_string_array()?;
    check_minus(&minus)?;
    update(ctx, call, &minus, &[]);
    Ok(Reply::empty())
}

/// Arguments are `(names to unset, assignments to set)`.
fn unset_and_set_environment(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    let minus = args.next_string_array()?;
    let plus = args.next_string_array()?;
    check_plus(&plus)?;
    check_minus(&minus)?;
    update(ctx, call, &minus, &plus);
    Ok(Reply::empty())
}
