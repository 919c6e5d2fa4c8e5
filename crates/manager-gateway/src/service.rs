//! Manager Gateway service - the single event loop that owns the context.
//!
//! ```text
//!  bus readers ─┐                        ┌──────────────────────────┐
//!  core hooks  ─┼─▶ GatewayHandle ──mpsc──▶ GatewayService::run()   │
//!  transport   ─┘   (clone freely)        │   └─▶ ManagerGateway     │
//!                                         │        ├─ Dispatcher     │
//!                                         │        └─ ManagerContext │
//!                                         └──────────────────────────┘
//! ```
//!
//! Events are handled one at a time, so the subscriber registry and the
//! deferred reply slot are only ever touched from the loop task.

use crate::auth::CallerIdentity;
use crate::broadcast::{DeliveryError, ManagerSignal};
use crate::context::ManagerContext;
use crate::dispatch::{CallContext, Dispatcher, Reply};
use crate::domain::correlation::CorrelationId;
use crate::domain::deferred::DeferredOutcome;
use crate::domain::error::GatewayError;
use crate::metrics::{CallOutcome, CallTimer};
use shared_bus::{BusConnection, ConnectionId, Message};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn};

/// Synchronous core of the gateway. Everything the event loop does goes
/// through one of these methods.
pub struct ManagerGateway {
    ctx: ManagerContext,
    dispatcher: Dispatcher,
}

impl ManagerGateway {
    pub fn new(ctx: ManagerContext) -> Result<Self, GatewayError> {
        let dispatcher = Dispatcher::new()?;
        info!(
            handlers = dispatcher.len(),
            properties = ctx.properties.len(),
            scope = ?ctx.scope(),
            "Manager gateway ready"
        );
        Ok(Self { ctx, dispatcher })
    }

    #[must_use]
    pub fn context(&self) -> &ManagerContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ManagerContext {
        &mut self.ctx
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Install the shared bus connection.
    pub fn attach_api_connection(&mut self, connection: Arc<dyn BusConnection>) {
        self.ctx.connections.set_api(connection);
    }

    /// A new private (peer-to-peer) connection was accepted.
    pub fn on_connection_opened(&mut self, connection: Arc<dyn BusConnection>) {
        self.ctx.connections.add_private(connection);
    }

    /// The transport lost `connection`. Every subscriber on it goes, and a
    /// held Reload reply addressed to it is dropped unsent.
    pub fn on_disconnect(&mut self, connection: ConnectionId) {
        let removed = self.ctx.subscribers.remove_on_disconnect(connection, None);
        let discarded = self.ctx.deferred.discard_for(connection, None);
        let known = self.ctx.connections.remove(connection);
        self.ctx.metrics.set_subscribers(self.ctx.subscribers.len());
        info!(
            connection = %connection,
            known,
            subscribers_removed = removed,
            deferred_discarded = discarded,
            "Connection closed"
        );
    }

    /// A client behind the shared bus went away while the connection stays.
    pub fn on_name_lost(&mut self, connection: ConnectionId, name: &str) {
        let removed = self
            .ctx
            .subscribers
            .remove_on_disconnect(connection, Some(name));
        let discarded = self.ctx.deferred.discard_for(connection, Some(name));
        self.ctx.metrics.set_subscribers(self.ctx.subscribers.len());
        debug!(
            connection = %connection,
            name,
            subscribers_removed = removed,
            deferred_discarded = discarded,
            "Bus name released"
        );
    }

    /// Dispatch one inbound message and build the reply to send, if any.
    ///
    /// Returns `None` for deferred and reply-less methods, for calls flagged
    /// no-reply-expected, and for anything that is not a method call.
    pub fn handle_call(&mut self, message: &Message, caller: &CallerIdentity) -> Option<Message> {
        if !message.is_method_call() {
            debug!(connection = %caller.connection, "Ignoring non-call message");
            return None;
        }

        let correlation_id = CorrelationId::new();
        let member = message.member().unwrap_or("");
        let span = info_span!(
            "bus_call",
            correlation_id = %correlation_id,
            method = member,
            connection = %caller.connection,
            sender = caller.sender.as_deref().unwrap_or(""),
        );
        let _enter = span.enter();

        let timer = CallTimer::start();
        let call = CallContext {
            message,
            caller,
            correlation_id,
        };

        let (outcome, reply) = match self.dispatcher.dispatch(&mut self.ctx, &call) {
            Ok(Reply::Return(body)) => (
                CallOutcome::Success,
                Some(Message::method_return(message, body)),
            ),
            Ok(Reply::Deferred) => (CallOutcome::Deferred, None),
            Ok(Reply::None) => (CallOutcome::Success, None),
            Err(fault) => {
                debug!(fault = fault.name(), detail = %fault, "Call failed");
                (CallOutcome::Fault, Some(fault.to_message(message)))
            }
        };
        timer.finish(&self.ctx.metrics, outcome);

        if message.flags.no_reply_expected {
            return None;
        }
        reply
    }

    /// Dispatch and write the reply back on the connection the call came in
    /// on. A vanished connection drops the reply.
    pub fn process_call(
        &mut self,
        message: &Message,
        caller: &CallerIdentity,
    ) -> Result<(), GatewayError> {
        let Some(reply) = self.handle_call(message, caller) else {
            return Ok(());
        };
        match self.ctx.connections.get(caller.connection) {
            Some(connection) => connection.send(reply).map_err(GatewayError::from),
            None => {
                debug!(connection = %caller.connection, "Reply dropped, connection gone");
                Ok(())
            }
        }
    }

    /// The core finished reloading; release the held Reload reply.
    pub fn on_reload_finished(&mut self) -> DeferredOutcome {
        let outcome = self.ctx.deferred.complete(&self.ctx.connections);
        debug!(outcome = ?outcome, "Reload finished");
        outcome
    }

    /// Fan a core state change out to subscribers.
    pub fn emit(&self, signal: &ManagerSignal) -> Result<usize, DeliveryError> {
        self.ctx.broadcast(signal)
    }
}

/// Input to the event loop.
pub enum GatewayEvent {
    /// Inbound message from a connection.
    Call {
        message: Message,
        caller: CallerIdentity,
    },
    ConnectionOpened(Arc<dyn BusConnection>),
    ApiAttached(Arc<dyn BusConnection>),
    Disconnected(ConnectionId),
    NameLost {
        connection: ConnectionId,
        name: String,
    },
    ReloadFinished,
    Signal(ManagerSignal),
    Shutdown,
}

impl fmt::Debug for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { message, caller } => f
                .debug_struct("Call")
                .field("member", &message.member())
                .field("connection", &caller.connection)
                .finish(),
            Self::ConnectionOpened(c) => f.debug_tuple("ConnectionOpened").field(&c.id()).finish(),
            Self::ApiAttached(c) => f.debug_tuple("ApiAttached").field(&c.id()).finish(),
            Self::Disconnected(id) => f.debug_tuple("Disconnected").field(id).finish(),
            Self::NameLost { connection, name } => f
                .debug_struct("NameLost")
                .field("connection", connection)
                .field("name", name)
                .finish(),
            Self::ReloadFinished => f.write_str("ReloadFinished"),
            Self::Signal(signal) => f.debug_tuple("Signal").field(&signal.member()).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable producer side of the event loop.
#[derive(Clone, Debug)]
pub struct GatewayHandle {
    tx: mpsc::Sender<GatewayEvent>,
}

impl GatewayHandle {
    async fn send(&self, event: GatewayEvent) -> Result<(), GatewayError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| GatewayError::ShuttingDown)
    }

    pub async fn call(&self, message: Message, caller: CallerIdentity) -> Result<(), GatewayError> {
        self.send(GatewayEvent::Call { message, caller }).await
    }

    pub async fn connection_opened(&self, connection: Arc<dyn BusConnection>) -> Result<(), GatewayError> {
        self.send(GatewayEvent::ConnectionOpened(connection)).await
    }

    pub async fn attach_api(&self, connection: Arc<dyn BusConnection>) -> Result<(), GatewayError> {
        self.send(GatewayEvent::ApiAttached(connection)).await
    }

    pub async fn disconnected(&self, connection: ConnectionId) -> Result<(), GatewayError> {
        self.send(GatewayEvent::Disconnected(connection)).await
    }

    pub async fn name_lost(&self, connection: ConnectionId, name: impl Into<String>) -> Result<(), GatewayError> {
        self.send(GatewayEvent::NameLost {
            connection,
            name: name.into(),
        })
        .await
    }

    pub async fn reload_finished(&self) -> Result<(), GatewayError> {
        self.send(GatewayEvent::ReloadFinished).await
    }

    pub async fn emit(&self, signal: ManagerSignal) -> Result<(), GatewayError> {
        self.send(GatewayEvent::Signal(signal)).await
    }

    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        self.send(GatewayEvent::Shutdown).await
    }
}

/// Event loop owning the gateway.
pub struct GatewayService {
    gateway: ManagerGateway,
    rx: mpsc::Receiver<GatewayEvent>,
}

impl GatewayService {
    /// Loop plus a handle feeding it. `capacity` bounds the queue.
    pub fn new(gateway: ManagerGateway, capacity: usize) -> (Self, GatewayHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { gateway, rx }, GatewayHandle { tx })
    }

    /// Loop sized from the gateway's own `event_loop.queue_capacity`.
    pub fn from_config(gateway: ManagerGateway) -> (Self, GatewayHandle) {
        let capacity = gateway.context().config.event_loop.queue_capacity;
        Self::new(gateway, capacity)
    }

    /// Process events until `Shutdown` arrives or every handle is dropped,
    /// then hand the gateway back.
    pub async fn run(mut self) -> ManagerGateway {
        info!("Manager gateway event loop started");
        while let Some(event) = self.rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        info!("Manager gateway event loop stopped");
        self.gateway
    }

    /// One event. Returns false when the loop should stop.
    fn handle(&mut self, event: GatewayEvent) -> bool {
        match event {
            GatewayEvent::Call { message, caller } => {
                if let Err(e) = self.gateway.process_call(&message, &caller) {
                    warn!(connection = %caller.connection, error = %e, "Failed to send reply");
                }
            }
            GatewayEvent::ConnectionOpened(connection) => {
                self.gateway.on_connection_opened(connection);
            }
            GatewayEvent::ApiAttached(connection) => {
                self.gateway.attach_api_connection(connection);
            }
            GatewayEvent::Disconnected(connection) => self.gateway.on_disconnect(connection),
            GatewayEvent::NameLost { connection, name } => {
                self.gateway.on_name_lost(connection, &name);
            }
            GatewayEvent::ReloadFinished => {
                self.gateway.on_reload_finished();
            }
            GatewayEvent::Signal(signal) => {
                // Per-connection failures are already logged and counted.
                let _ = self.gateway.emit(&signal);
            }
            GatewayEvent::Shutdown => return false,
        }
        true
    }
}
