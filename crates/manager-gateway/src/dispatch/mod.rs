//! Request Dispatcher - routes method calls to handlers.
//!
//! ```text
//!   call ──▶ path? ──▶ (interface, member) ──▶ in_signature ──▶ gate
//!             │              │                     │             │
//!        UnknownObject  UnknownMethod         InvalidArgs   AccessDenied
//!                                                                │
//!                                 out_signature ◀── handler ◀────┘
//!                                      │
//!                                    Failed (never sent malformed)
//! ```
//!
//! The table is built once in [`Dispatcher::new`]; signatures are parsed
//! there so a broken entry fails construction instead of a call.

mod environment;
mod jobs;
mod lifecycle;
mod subscription;
mod unit_files;
mod units;

use crate::auth::{AccessVerb, CallerIdentity};
use crate::context::ManagerContext;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BusFault, FaultKind, FaultResult, GatewayError};
use crate::domain::types::{AuxUnit, JobMode, MANAGER_INTERFACE};
use shared_bus::{Message, Signature, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error};

/// Handler entry point.
pub type Handler =
    fn(&mut ManagerContext, &CallContext<'_>, &mut Args<'_>) -> FaultResult<Reply>;

/// One row of the dispatch table.
#[derive(Clone, Copy)]
pub struct HandlerDescriptor {
    pub interface: &'static str,
    pub member: &'static str,
    pub in_signature: &'static str,
    pub out_signature: &'static str,
    /// Coarse access verb checked before the handler runs.
    pub access: AccessVerb,
    pub handler: Handler,
}

impl HandlerDescriptor {
    /// Manager-interface entry.
    pub const fn manager(
        member: &'static str,
        in_signature: &'static str,
        out_signature: &'static str,
        access: AccessVerb,
        handler: Handler,
    ) -> Self {
        Self {
            interface: MANAGER_INTERFACE,
            member,
            in_signature,
            out_signature,
            access,
            handler,
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("interface", &self.interface)
            .field("member", &self.member)
            .field("in_signature", &self.in_signature)
            .field("out_signature", &self.out_signature)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

/// What a handler wants sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Method return with these values.
    Return(Vec<Value>),
    /// Held by the deferred reply tracker.
    Deferred,
    /// No reply at all.
    None,
}

impl Reply {
    /// Empty method return.
    #[must_use]
    pub fn empty() -> Self {
        Reply::Return(Vec::new())
    }
}

/// Per-call information available to handlers.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub message: &'a Message,
    pub caller: &'a CallerIdentity,
    pub correlation_id: CorrelationId,
}

/// Cursor over a call body already checked against the in-signature.
#[derive(Debug)]
pub struct Args<'a> {
    body: &'a [Value],
    position: usize,
}

impl<'a> Args<'a> {
    #[must_use]
    pub fn new(body: &'a [Value]) -> Self {
        Self { body, position: 0 }
    }

    /// Next argument, variants left wrapped.
    pub fn next_value(&mut self) -> FaultResult<&'a Value> {
        let value = self.body.get(self.position).ok_or_else(|| {
            BusFault::invalid_args(format!("missing argument {}", self.position + 1))
        })?;
        self.position += 1;
        Ok(value)
    }

    fn next_as<T>(&mut self, kind: &str, f: impl FnOnce(&'a Value) -> Option<T>) -> FaultResult<T> {
        let position = self.position + 1;
        let value = self.next_value()?;
        f(value).ok_or_else(|| {
            BusFault::invalid_args(format!("argument {}: expected {}", position, kind))
        })
    }

    pub fn next_str(&mut self) -> FaultResult<&'a str> {
        self.next_as("string", Value::as_str)
    }

    pub fn next_u32(&mut self) -> FaultResult<u32> {
        self.next_as("uint32", Value::as_u32)
    }

    pub fn next_i32(&mut self) -> FaultResult<i32> {
        self.next_as("int32", Value::as_i32)
    }

    pub fn next_bool(&mut self) -> FaultResult<bool> {
        self.next_as("boolean", Value::as_bool)
    }

    pub fn next_string_array(&mut self) -> FaultResult<Vec<String>> {
        self.next_as("string array", Value::to_string_vec)
    }

    /// `a(sv)` as name/value pairs with the variants unwrapped.
    pub fn next_properties(&mut self) -> FaultResult<Vec<(String, Value)>> {
        self.next_as("property array", properties_of)
    }

    /// `a(sa(sv))` auxiliary units.
    pub fn next_aux(&mut self) -> FaultResult<Vec<AuxUnit>> {
        self.next_as("auxiliary unit array", |value| {
            value
                .as_array()?
                .iter()
                .map(|entry| match entry.as_struct()? {
                    [name, properties] => {
                        Some((name.as_str()?.to_string(), properties_of(properties)?))
                    }
                    _ => None,
                })
                .collect()
        })
    }
}

fn properties_of(value: &Value) -> Option<Vec<(String, Value)>> {
    value
        .as_array()?
        .iter()
        .map(|entry| match entry.as_struct()? {
            [name, inner] => Some((name.as_str()?.to_string(), inner.as_variant()?.clone())),
            _ => None,
        })
        .collect()
}

struct Entry {
    descriptor: HandlerDescriptor,
    input: Signature,
    output: Signature,
}

/// Exact-match `(interface, member)` lookup table.
pub struct Dispatcher {
    interfaces: BTreeMap<&'static str, BTreeMap<&'static str, Entry>>,
}

impl Dispatcher {
    /// Build the table from every handler module.
    pub fn new() -> Result<Self, GatewayError> {
        let tables: [&[HandlerDescriptor]; 7] = [
            units::HANDLERS,
            jobs::HANDLERS,
            subscription::HANDLERS,
            lifecycle::HANDLERS,
            environment::HANDLERS,
            unit_files::HANDLERS,
            crate::properties::HANDLERS,
        ];

        let mut interfaces: BTreeMap<&'static str, BTreeMap<&'static str, Entry>> =
            BTreeMap::new();
        for descriptor in tables.into_iter().flatten().copied() {
            let entry = Entry {
                input: Signature::parse(descriptor.in_signature)?,
                output: Signature::parse(descriptor.out_signature)?,
                descriptor,
            };
            let members = interfaces.entry(descriptor.interface).or_default();
            if members.insert(descriptor.member, entry).is_some() {
                return Err(GatewayError::Internal(format!(
                    "duplicate handler {}.{}",
                    descriptor.interface, descriptor.member
                )));
            }
        }

        let dispatcher = Self { interfaces };
        debug!(handlers = dispatcher.len(), "Dispatch table built");
        Ok(dispatcher)
    }

    fn entry(&self, interface: &str, member: &str) -> Option<&Entry> {
        self.interfaces.get(interface)?.get(member)
    }

    /// Descriptor for an interface/member pair.
    #[must_use]
    pub fn descriptor(&self, interface: &str, member: &str) -> Option<&HandlerDescriptor> {
        self.entry(interface, member).map(|entry| &entry.descriptor)
    }

    /// All descriptors in `(interface, member)` order.
    pub fn descriptors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.interfaces
            .values()
            .flat_map(BTreeMap::values)
            .map(|entry| &entry.descriptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interfaces.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one call to completion.
    pub fn dispatch(&self, ctx: &mut ManagerContext, call: &CallContext<'_>) -> FaultResult<Reply> {
        let message = call.message;
        let path = message.path().map(|p| p.as_str()).unwrap_or("");
        if path != ctx.config.bus.object_path {
            return Err(BusFault::unknown_object(path));
        }

        let interface = message.interface().unwrap_or(MANAGER_INTERFACE);
        let member = message.member().unwrap_or("");
        let entry = self
            .entry(interface, member)
            .ok_or_else(|| BusFault::unknown_method(interface, member))?;

        entry.input.check(&message.body).map_err(|e| {
            BusFault::invalid_args(format!("Invalid arguments to {}: {}", member, e))
        })?;

        if let Err(fault) = ctx.gate.check(call.caller, entry.descriptor.access) {
            ctx.metrics.record_access_denied();
            return Err(fault);
        }

        let mut args = Args::new(&message.body);
        let reply = match (entry.descriptor.handler)(ctx, call, &mut args) {
            Ok(reply) => reply,
            Err(fault) => {
                // Per-unit denials raised inside the handler.
                if fault.kind == FaultKind::AccessDenied {
                    ctx.metrics.record_access_denied();
                }
                return Err(fault);
            }
        };

        if let Reply::Return(values) = &reply {
            if let Err(e) = entry.output.check(values) {
                error!(
                    correlation_id = %call.correlation_id,
                    method = member,
                    error = %e,
                    "Handler reply does not match its signature"
                );
                return Err(BusFault::failed(format!(
                    "Internal error: reply to {} is malformed.",
                    member
                )));
            }
        }
        Ok(reply)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Parse a job mode argument.
fn parse_job_mode(mode: &str, message: impl FnOnce(&str) -> String) -> FaultResult<JobMode> {
    mode.parse().map_err(|()| BusFault::invalid_args(message(mode)))
}
