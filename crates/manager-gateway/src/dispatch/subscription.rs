//! Subscribe / Unsubscribe.

use super::{Args, CallContext, HandlerDescriptor, Reply};
use crate::auth::AccessVerb;
use crate::context::ManagerContext;
use crate::domain::error::{BusFault, FaultResult};
use crate::subscribers::Subscriber;
use tracing::info;

pub(super) const HANDLERS: &[HandlerDescriptor] = &[
    HandlerDescriptor::manager("Subscribe", "", "", AccessVerb::Status, subscribe),
    HandlerDescriptor::manager("Unsubscribe", "", "", AccessVerb::Status, unsubscribe),
];

/// Callers on the shared bus are keyed by unique name; a private
/// connection is one client and carries no name.
fn subscriber_for(ctx: &ManagerContext, call: &CallContext<'_>) -> Subscriber {
    let connection = call.caller.connection;
    let name = if ctx.connections.is_api(connection) {
        call.caller.sender.clone()
    } else {
        None
    };
    Subscriber::new(connection, name)
}

fn subscribe(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    let subscriber = subscriber_for(ctx, call);
    if !ctx.subscribers.subscribe(subscriber.clone()) {
        return Err(BusFault::already_subscribed());
    }
    ctx.metrics.set_subscribers(ctx.subscribers.len());
    info!(
        correlation_id = %call.correlation_id,
        connection = %subscriber.connection,
        name = subscriber.name.as_deref().unwrap_or(""),
        "Client subscribed"
    );
    Ok(Reply::empty())
}

fn unsubscribe(ctx: &mut ManagerContext, call: &CallContext<'_>, _args: &mut Args<'_>) -> FaultResult<Reply> {
    let subscriber = subscriber_for(ctx, call);
    if !ctx.subscribers.unsubscribe(&subscriber) {
        return Err(BusFault::not_subscribed());
    }
    ctx.metrics.set_subscribers(ctx.subscribers.len());
    info!(
        correlation_id = %call.correlation_id,
        connection = %subscriber.connection,
        "Client unsubscribed"
    );
    Ok(Reply::empty())
}
