//! # Typed Values
//!
//! A message body is a `Vec<Value>`. Arrays carry their element type so an
//! empty array still has a signature.

use crate::path::ObjectPath;
use crate::signature::Type;
use serde::{Deserialize, Serialize};

/// One typed argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    UInt64(u64),
    Double(f64),
    Str(String),
    ObjectPath(ObjectPath),
    /// Element type and elements.
    Array(Type, Vec<Value>),
    Struct(Vec<Value>),
    DictEntry(Box<Value>, Box<Value>),
    Variant(Box<Value>),
}

impl Value {
    /// Wrap a value in a variant.
    #[must_use]
    pub fn variant(inner: Value) -> Self {
        Value::Variant(Box::new(inner))
    }

    /// Build an `as` array.
    pub fn string_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Array(
            Type::Str,
            items.into_iter().map(|s| Value::Str(s.into())).collect(),
        )
    }

    /// Build an `a{sv}` dictionary.
    pub fn dict<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Array(
            Type::DictEntry(Box::new(Type::Str), Box::new(Type::Variant)),
            entries
                .into_iter()
                .map(|(k, v)| {
                    Value::DictEntry(
                        Box::new(Value::Str(k.into())),
                        Box::new(Value::variant(v)),
                    )
                })
                .collect(),
        )
    }

    /// The concrete type of this value.
    #[must_use]
    pub fn value_type(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Int32(_) => Type::Int32,
            Value::UInt32(_) => Type::UInt32,
            Value::UInt64(_) => Type::UInt64,
            Value::Double(_) => Type::Double,
            Value::Str(_) => Type::Str,
            Value::ObjectPath(_) => Type::ObjectPath,
            Value::Array(elem, _) => Type::array_of(elem.clone()),
            Value::Struct(fields) => Type::Struct(fields.iter().map(Value::value_type).collect()),
            Value::DictEntry(k, v) => {
                Type::DictEntry(Box::new(k.value_type()), Box::new(v.value_type()))
            }
            Value::Variant(_) => Type::Variant,
        }
    }

    /// Structural type check. Array elements are checked against the
    /// declared element type as well.
    #[must_use]
    pub fn matches(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Bool(_), Type::Bool)
            | (Value::Int32(_), Type::Int32)
            | (Value::UInt32(_), Type::UInt32)
            | (Value::UInt64(_), Type::UInt64)
            | (Value::Double(_), Type::Double)
            | (Value::Str(_), Type::Str)
            | (Value::ObjectPath(_), Type::ObjectPath)
            | (Value::Variant(_), Type::Variant) => true,
            (Value::Array(elem, items), Type::Array(expected)) => {
                elem == expected.as_ref() && items.iter().all(|item| item.matches(elem))
            }
            (Value::Struct(fields), Type::Struct(types)) => {
                fields.len() == types.len()
                    && fields.iter().zip(types).all(|(f, t)| f.matches(t))
            }
            (Value::DictEntry(k, v), Type::DictEntry(kt, vt)) => k.matches(kt) && v.matches(vt),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt32(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object_path(&self) -> Option<&ObjectPath> {
        match self {
            Value::ObjectPath(p) => Some(p),
            _ => None,
        }
    }

    /// Elements of an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(_, items) => Some(items),
            _ => None,
        }
    }

    /// Fields of a struct.
    #[must_use]
    pub fn as_struct(&self) -> Option<&[Value]> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Inner value of a variant.
    #[must_use]
    pub fn as_variant(&self) -> Option<&Value> {
        match self {
            Value::Variant(inner) => Some(inner),
            _ => None,
        }
    }

    /// Collect an `as` array into owned strings.
    #[must_use]
    pub fn to_string_vec(&self) -> Option<Vec<String>> {
        self.as_array()?
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<ObjectPath> for Value {
    fn from(v: ObjectPath) -> Self {
        Value::ObjectPath(v)
    }
}
