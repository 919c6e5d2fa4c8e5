//! # Object Paths
//!
//! Validated object paths plus the label escaping used to turn unit names
//! into path elements (`foo-bar.service` → `foo_2dbar_2eservice`).

use crate::error::SignatureError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A syntactically valid object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Validate and wrap a path.
    ///
    /// # Errors
    ///
    /// `SignatureError::InvalidObjectPath` when the path is not absolute,
    /// has empty elements, a trailing slash, or characters outside
    /// `[A-Za-z0-9_]`.
    pub fn new(path: impl Into<String>) -> Result<Self, SignatureError> {
        let path = path.into();
        if is_valid(&path) {
            Ok(Self(path))
        } else {
            Err(SignatureError::InvalidObjectPath(path))
        }
    }

    /// The root path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Append one raw element, escaping it first.
    #[must_use]
    pub fn join_escaped(&self, element: &str) -> Self {
        let escaped = escape_element(element);
        if self.0 == "/" {
            Self(format!("/{}", escaped))
        } else {
            Self(format!("{}/{}", self.0, escaped))
        }
    }

    /// Append a numeric element verbatim (`.../job` + 42 → `.../job/42`).
    #[must_use]
    pub fn join_number(&self, n: u64) -> Self {
        if self.0 == "/" {
            Self(format!("/{}", n))
        } else {
            Self(format!("{}/{}", self.0, n))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    rest.split('/').all(|element| {
        !element.is_empty()
            && element
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    })
}

/// Escape an arbitrary label into a single path element.
///
/// Bytes outside `[A-Za-z0-9]`, and a leading digit, become `_xx` with two
/// lowercase hex digits. The empty label maps to `_`.
#[must_use]
pub fn escape_element(label: &str) -> String {
    if label.is_empty() {
        return "_".to_string();
    }

    let mut out = String::with_capacity(label.len() * 3);
    for (i, b) in label.bytes().enumerate() {
        if b.is_ascii_alphabetic() || (b.is_ascii_digit() && i > 0) {
            out.push(char::from(b));
        } else {
            out.push('_');
            out.push_str(&format!("{:02x}", b));
        }
    }
    out
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = SignatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
