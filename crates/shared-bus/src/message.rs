//! # Messages
//!
//! Four kinds travel over a connection:
//!
//! | Kind          | Addressed by                  | Correlation      |
//! |---------------|-------------------------------|------------------|
//! | `MethodCall`  | path + interface + member     | own `serial`     |
//! | `MethodReturn`| destination                   | `reply_serial`   |
//! | `Error`       | destination + error name      | `reply_serial`   |
//! | `Signal`      | path + interface + member     | none             |
//!
//! Serials are allocated from a process-wide counter and never reused.

use crate::path::ObjectPath;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1);

fn next_serial() -> u32 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// What a message is, with the addressing that kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageKind {
    MethodCall {
        path: ObjectPath,
        interface: Option<String>,
        member: String,
    },
    MethodReturn {
        reply_serial: u32,
    },
    Error {
        name: String,
        reply_serial: u32,
    },
    Signal {
        path: ObjectPath,
        interface: String,
        member: String,
    },
}

/// Header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    /// The caller does not want a reply.
    pub no_reply_expected: bool,
}

/// A complete message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub serial: u32,
    pub kind: MessageKind,
    /// Unique name of the sending peer, when known.
    pub sender: Option<String>,
    /// Unique name of the receiver; `None` means broadcast.
    pub destination: Option<String>,
    pub flags: MessageFlags,
    pub body: Vec<Value>,
}

impl Message {
    /// Build a method call.
    pub fn method_call(
        path: ObjectPath,
        interface: impl Into<String>,
        member: impl Into<String>,
        body: Vec<Value>,
    ) -> Self {
        Self {
            serial: next_serial(),
            kind: MessageKind::MethodCall {
                path,
                interface: Some(interface.into()),
                member: member.into(),
            },
            sender: None,
            destination: None,
            flags: MessageFlags::default(),
            body,
        }
    }

    /// Build the successful reply to `call`.
    #[must_use]
    pub fn method_return(call: &Message, body: Vec<Value>) -> Self {
        Self::method_return_to(call.serial, call.sender.clone(), body)
    }

    /// Build a reply from stored correlation data, used once the original
    /// call is long gone.
    #[must_use]
    pub fn method_return_to(reply_serial: u32, destination: Option<String>, body: Vec<Value>) -> Self {
        Self {
            serial: next_serial(),
            kind: MessageKind::MethodReturn { reply_serial },
            sender: None,
            destination,
            flags: MessageFlags::default(),
            body,
        }
    }

    /// Build an error reply to `call` carrying one human-readable string.
    pub fn error(call: &Message, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            serial: next_serial(),
            kind: MessageKind::Error {
                name: name.into(),
                reply_serial: call.serial,
            },
            sender: None,
            destination: call.sender.clone(),
            flags: MessageFlags::default(),
            body: vec![Value::Str(text.into())],
        }
    }

    /// Build a broadcast signal.
    pub fn signal(
        path: ObjectPath,
        interface: impl Into<String>,
        member: impl Into<String>,
        body: Vec<Value>,
    ) -> Self {
        Self {
            serial: next_serial(),
            kind: MessageKind::Signal {
                path,
                interface: interface.into(),
                member: member.into(),
            },
            sender: None,
            destination: None,
            flags: MessageFlags::default(),
            body,
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: Option<String>) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub fn with_no_reply_expected(mut self) -> Self {
        self.flags.no_reply_expected = true;
        self
    }

    /// Member name for calls and signals.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { member, .. } | MessageKind::Signal { member, .. } => {
                Some(member)
            }
            _ => None,
        }
    }

    /// Interface name for calls and signals.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { interface, .. } => interface.as_deref(),
            MessageKind::Signal { interface, .. } => Some(interface),
            _ => None,
        }
    }

    /// Object path for calls and signals.
    #[must_use]
    pub fn path(&self) -> Option<&ObjectPath> {
        match &self.kind {
            MessageKind::MethodCall { path, .. } | MessageKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Serial of the call this message answers.
    #[must_use]
    pub fn reply_serial(&self) -> Option<u32> {
        match &self.kind {
            MessageKind::MethodReturn { reply_serial }
            | MessageKind::Error { reply_serial, .. } => Some(*reply_serial),
            _ => None,
        }
    }

    /// Error name, for error replies.
    #[must_use]
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Error { name, .. } => Some(name),
            _ => None,
        }
    }

    /// First body argument as a string (the error text for error replies).
    #[must_use]
    pub fn first_str(&self) -> Option<&str> {
        self.body.first().and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_method_call(&self) -> bool {
        matches!(self.kind, MessageKind::MethodCall { .. })
    }

    #[must_use]
    pub fn is_method_return(&self) -> bool {
        matches!(self.kind, MessageKind::MethodReturn { .. })
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.kind, MessageKind::Error { .. })
    }

    #[must_use]
    pub fn is_signal(&self) -> bool {
        matches!(self.kind, MessageKind::Signal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> Message {
        Message::method_call(
            ObjectPath::new("/org/freedesktop/systemd1").unwrap(),
            "org.freedesktop.systemd1.Manager",
            "GetUnit",
            vec![Value::from("foo.service")],
        )
        .with_sender(":1.42")
    }

    #[test]
    fn test_method_call_accessors() {
        let c = call();
        assert!(c.is_method_call());
        assert_eq!(c.member(), Some("GetUnit"));
        assert_eq!(c.interface(), Some("org.freedesktop.systemd1.Manager"));
        assert_eq!(c.path().map(ObjectPath::as_str), Some("/org/freedesktop/systemd1"));
        assert_eq!(c.first_str(), Some("foo.service"));
        assert_eq!(c.reply_serial(), None);
    }

    #[test]
    fn test_reply_correlates() {
        let c = call();
        let r = Message::method_return(&c, vec![]);
        assert!(r.is_method_return());
        assert_eq!(r.reply_serial(), Some(c.serial));
        assert_eq!(r.destination.as_deref(), Some(":1.42"));
        assert_ne!(r.serial, c.serial);
    }

    #[test]
    fn test_error_reply() {
        let c = call();
        let e = Message::error(&c, "org.freedesktop.DBus.Error.Failed", "boom");
        assert!(e.is_error());
        assert_eq!(e.error_name(), Some("org.freedesktop.DBus.Error.Failed"));
        assert_eq!(e.first_str(), Some("boom"));
        assert_eq!(e.reply_serial(), Some(c.serial));
    }

    #[test]
    fn test_signal_is_broadcast_by_default() {
        let s = Message::signal(ObjectPath::root(), "org.example", "Changed", vec![]);
        assert!(s.is_signal());
        assert!(s.destination.is_none());
        let s = s.with_destination(Some(":1.7".into()));
        assert_eq!(s.destination.as_deref(), Some(":1.7"));
    }

    #[test]
    fn test_flags() {
        let c = call().with_no_reply_expected();
        assert!(c.flags.no_reply_expected);
    }
}
