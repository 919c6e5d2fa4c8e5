//! Property Accessor - manager attributes over the standard properties
//! interface.
//!
//! The table is ordered; `GetAll` reports properties in table order.
//! Getters never change state. Setters check the value's type and domain
//! before anything is applied.

use crate::auth::AccessVerb;
use crate::context::ManagerContext;
use crate::dispatch::{Args, CallContext, HandlerDescriptor, Reply};
use crate::domain::error::{BusFault, FaultResult};
use crate::domain::types::MANAGER_INTERFACE;
use crate::telemetry::{LogLevel, LogTarget, TelemetryError};
use shared_bus::{Signature, SignatureError, Type, Value, PROPERTIES_INTERFACE};
use std::fmt;
use tracing::info;

pub type Getter = fn(&ManagerContext) -> FaultResult<Value>;
pub type Setter = fn(&mut ManagerContext, &Value) -> FaultResult<()>;

/// One manager property.
#[derive(Clone, Copy)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub signature: &'static str,
    pub getter: Getter,
    pub setter: Option<Setter>,
}

impl PropertyDescriptor {
    const fn read_only(name: &'static str, signature: &'static str, getter: Getter) -> Self {
        Self {
            name,
            signature,
            getter,
            setter: None,
        }
    }

    const fn writable(
        name: &'static str,
        signature: &'static str,
        getter: Getter,
        setter: Setter,
    ) -> Self {
        Self {
            name,
            signature,
            getter,
            setter: Some(setter),
        }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Realtime and monotonic twins of one boot timestamp.
macro_rules! dual_timestamp {
    ($name:literal, $field:ident) => {
        [
            PropertyDescriptor::read_only($name, "t", |ctx| {
                Ok(Value::UInt64(ctx.core.timestamps().$field.realtime))
            }),
            PropertyDescriptor::read_only(concat!($name, "Monotonic"), "t", |ctx| {
                Ok(Value::UInt64(ctx.core.timestamps().$field.monotonic))
            }),
        ]
    };
}

fn table() -> Vec<PropertyDescriptor> {
    let mut table = vec![
        PropertyDescriptor::read_only("Version", "s", |ctx| {
            Ok(ctx.config.manager.version.as_str().into())
        }),
        PropertyDescriptor::read_only("Features", "s", |ctx| {
            Ok(ctx.config.manager.features.as_str().into())
        }),
        PropertyDescriptor::read_only("Virtualization", "s", |ctx| {
            Ok(ctx.probe.virtualization().into())
        }),
        PropertyDescriptor::read_only("Tainted", "s", get_tainted),
    ];

    table.extend(dual_timestamp!("FirmwareTimestamp", firmware));
    table.extend(dual_timestamp!("LoaderTimestamp", loader));
    table.extend(dual_timestamp!("KernelTimestamp", kernel));
    table.extend(dual_timestamp!("InitRDTimestamp", initrd));
    table.extend(dual_timestamp!("UserspaceTimestamp", userspace));
    table.extend(dual_timestamp!("FinishTimestamp", finish));
    table.extend(dual_timestamp!("SecurityStartTimestamp", security_start));
    table.extend(dual_timestamp!("SecurityFinishTimestamp", security_finish));
    table.extend(dual_timestamp!("GeneratorsStartTimestamp", generators_start));
    table.extend(dual_timestamp!("GeneratorsFinishTimestamp", generators_finish));
    table.extend(dual_timestamp!("UnitsLoadStartTimestamp", units_load_start));
    table.extend(dual_timestamp!("UnitsLoadFinishTimestamp", units_load_finish));

    table.extend([
        PropertyDescriptor::writable(
            "LogLevel",
            "s",
            |ctx| Ok(ctx.log_control.level().as_str().into()),
            set_log_level,
        ),
        PropertyDescriptor::writable(
            "LogTarget",
            "s",
            |ctx| Ok(ctx.log_control.target().as_str().into()),
            set_log_target,
        ),
        PropertyDescriptor::read_only("NNames", "u", |ctx| Ok(ctx.core.counters().n_names.into())),
        PropertyDescriptor::read_only("NJobs", "u", |ctx| Ok(ctx.core.counters().n_jobs.into())),
        PropertyDescriptor::read_only("NInstalledJobs", "u", |ctx| {
            Ok(ctx.core.counters().n_installed_jobs.into())
        }),
        PropertyDescriptor::read_only("NFailedJobs", "u", |ctx| {
            Ok(ctx.core.counters().n_failed_jobs.into())
        }),
        PropertyDescriptor::read_only("Progress", "d", |ctx| {
            let finished = ctx.core.timestamps().finish.is_set();
            Ok(ctx.core.counters().progress(finished).into())
        }),
        PropertyDescriptor::read_only("Environment", "as", |ctx| {
            Ok(Value::string_array(ctx.core.environment()))
        }),
        PropertyDescriptor::read_only("ConfirmSpawn", "b", |ctx| {
            Ok(ctx.core.settings().confirm_spawn.into())
        }),
        PropertyDescriptor::read_only("ShowStatus", "b", |ctx| {
            Ok(ctx.core.settings().show_status.into())
        }),
        PropertyDescriptor::read_only("UnitPath", "as", |ctx| {
            Ok(Value::string_array(ctx.core.settings().unit_path))
        }),
        PropertyDescriptor::read_only("DefaultStandardOutput", "s", |ctx| {
            Ok(ctx.core.settings().default_std_output.as_str().into())
        }),
        PropertyDescriptor::read_only("DefaultStandardError", "s", |ctx| {
            Ok(ctx.core.settings().default_std_error.as_str().into())
        }),
        PropertyDescriptor::writable(
            "RuntimeWatchdogUSec",
            "t",
            |ctx| Ok(ctx.core.runtime_watchdog_usec().into()),
            |ctx, value| {
                let usec = expect_u64(value)?;
                ctx.core.set_runtime_watchdog_usec(usec)?;
                Ok(())
            },
        ),
        PropertyDescriptor::writable(
            "ShutdownWatchdogUSec",
            "t",
            |ctx| Ok(ctx.core.shutdown_watchdog_usec().into()),
            |ctx, value| {
                ctx.core.set_shutdown_watchdog_usec(expect_u64(value)?);
                Ok(())
            },
        ),
    ]);

    table
}

/// Colon-separated taint flags, empty when clean.
fn get_tainted(ctx: &ManagerContext) -> FaultResult<Value> {
    let probe = &ctx.probe;
    let flags = [
        (ctx.core.settings().taint_usr, "split-usr"),
        (!probe.mtab_is_symlink(), "mtab-not-symlink"),
        (!probe.cgroups_available(), "cgroups-missing"),
        (probe.hwclock_is_localtime(), "local-hwclock"),
    ];
    let tainted: Vec<&str> = flags
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();
    Ok(tainted.join(":").into())
}

fn expect_u64(value: &Value) -> FaultResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| BusFault::invalid_args("Expected a uint64 value."))
}

fn expect_str(value: &Value) -> FaultResult<&str> {
    value
        .as_str()
        .ok_or_else(|| BusFault::invalid_args("Expected a string value."))
}

fn telemetry_fault(e: TelemetryError) -> BusFault {
    match e {
        TelemetryError::InvalidLevel(_) | TelemetryError::InvalidTarget(_) => {
            BusFault::invalid_args(e.to_string())
        }
        TelemetryError::Init(_) | TelemetryError::Reload(_) => BusFault::failed(e.to_string()),
    }
}

fn set_log_level(ctx: &mut ManagerContext, value: &Value) -> FaultResult<()> {
    let level: LogLevel = expect_str(value)?.parse().map_err(telemetry_fault)?;
    ctx.log_control.set_level(level).map_err(telemetry_fault)?;
    info!(level = %level, "Setting log level");
    Ok(())
}

fn set_log_target(ctx: &mut ManagerContext, value: &Value) -> FaultResult<()> {
    let target: LogTarget = expect_str(value)?.parse().map_err(telemetry_fault)?;
    ctx.log_control.set_target(target).map_err(telemetry_fault)?;
    info!(target_name = %target, "Setting log target");
    Ok(())
}

struct Entry {
    descriptor: PropertyDescriptor,
    value_type: Type,
}

/// Ordered property table with parsed value types.
pub struct PropertyAccessor {
    entries: Vec<Entry>,
}

impl PropertyAccessor {
    pub fn new() -> Result<Self, SignatureError> {
        let entries = table()
            .into_iter()
            .map(|descriptor| {
                let signature = Signature::parse(descriptor.signature)?;
                match signature.types() {
                    [value_type] => Ok(Entry {
                        descriptor,
                        value_type: value_type.clone(),
                    }),
                    _ => Err(SignatureError::Malformed(descriptor.signature.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.entry(name).map(|e| &e.descriptor)
    }

    /// Property names in table order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.descriptor.name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PropertyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("properties", &self.entries.len())
            .finish()
    }
}

/// Read one property.
pub fn get(ctx: &ManagerContext, name: &str) -> FaultResult<Value> {
    let entry = ctx
        .properties
        .entry(name)
        .ok_or_else(|| BusFault::unknown_property(name))?;
    (entry.descriptor.getter)(ctx)
}

/// Read every property, in table order.
pub fn get_all(ctx: &ManagerContext) -> FaultResult<Vec<(&'static str, Value)>> {
    ctx.properties
        .entries
        .iter()
        .map(|entry| Ok((entry.descriptor.name, (entry.descriptor.getter)(ctx)?)))
        .collect()
}

/// Write one property. `value` is the unwrapped variant content.
pub fn set(ctx: &mut ManagerContext, name: &str, value: &Value) -> FaultResult<()> {
    let (setter, value_type) = {
        let entry = ctx
            .properties
            .entry(name)
            .ok_or_else(|| BusFault::unknown_property(name))?;
        let setter = entry
            .descriptor
            .setter
            .ok_or_else(|| BusFault::property_read_only(name))?;
        (setter, entry.value_type.clone())
    };

    if !value.matches(&value_type) {
        return Err(BusFault::invalid_args(format!(
            "Property '{}' expects type \"{}\", got \"{}\".",
            name,
            value_type,
            value.value_type()
        )));
    }
    setter(ctx, value)
}

// Properties interface handlers

pub(crate) const HANDLERS: &[HandlerDescriptor] = &[
    HandlerDescriptor {
        interface: PROPERTIES_INTERFACE,
        member: "Get",
        in_signature: "ss",
        out_signature: "v",
        access: AccessVerb::Status,
        handler: handle_get,
    },
    HandlerDescriptor {
        interface: PROPERTIES_INTERFACE,
        member: "GetAll",
        in_signature: "s",
        out_signature: "a{sv}",
        access: AccessVerb::Status,
        handler: handle_get_all,
    },
    HandlerDescriptor {
        interface: PROPERTIES_INTERFACE,
        member: "Set",
        in_signature: "ssv",
        out_signature: "",
        access: AccessVerb::Reload,
        handler: handle_set,
    },
];

/// The empty interface name means "any".
fn check_interface(interface: &str) -> FaultResult<()> {
    if interface.is_empty() || interface == MANAGER_INTERFACE {
        Ok(())
    } else {
        Err(BusFault::unknown_interface(interface))
    }
}

fn handle_get(ctx: &mut ManagerContext, _call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    check_interface(args.next_str()?)?;
    let value = get(ctx, args.next_str()?)?;
    Ok(Reply::Return(vec![Value::variant(value)]))
}

fn handle_get_all(ctx: &mut ManagerContext, _call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    check_interface(args.next_str()?)?;
    Ok(Reply::Return(vec![Value::dict(get_all(ctx)?)]))
}

fn handle_set(ctx: &mut ManagerContext, call: &CallContext<'_>, args: &mut Args<'_>) -> FaultResult<Reply> {
    check_interface(args.next_str()?)?;
    let name = args.next_str()?;
    let value = args.next_value()?;
    let value = value.as_variant().unwrap_or(value);
    set(ctx, name, value)?;
    info!(
        correlation_id = %call.correlation_id,
        property = name,
        "Property set"
    );
    Ok(Reply::empty())
}
