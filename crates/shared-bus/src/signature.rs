//! # Type Signatures
//!
//! Parses bus type strings (`"ssa(sv)"`, `"a{sv}"`, ...) into [`Type`] trees
//! and checks message bodies against them. A failed check yields a readable
//! explanation that the gateway forwards verbatim inside `InvalidArgs`.
//!
//! Supported codes: `b i u t d s o v`, arrays `a`, structs `( )` and dict
//! entries `{ }` (only as an array element).

use crate::error::SignatureError;
use crate::value::Value;
use crate::MAX_SIGNATURE_DEPTH;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single complete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int32,
    UInt32,
    UInt64,
    Double,
    Str,
    ObjectPath,
    Variant,
    Array(Box<Type>),
    Struct(Vec<Type>),
    DictEntry(Box<Type>, Box<Type>),
}

impl Type {
    /// Basic types may be used as dict-entry keys.
    #[must_use]
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Int32
                | Type::UInt32
                | Type::UInt64
                | Type::Double
                | Type::Str
                | Type::ObjectPath
        )
    }

    /// Shorthand for `Type::Array(Box::new(elem))`.
    #[must_use]
    pub fn array_of(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("b"),
            Type::Int32 => f.write_str("i"),
            Type::UInt32 => f.write_str("u"),
            Type::UInt64 => f.write_str("t"),
            Type::Double => f.write_str("d"),
            Type::Str => f.write_str("s"),
            Type::ObjectPath => f.write_str("o"),
            Type::Variant => f.write_str("v"),
            Type::Array(elem) => write!(f, "a{}", elem),
            Type::Struct(fields) => {
                f.write_str("(")?;
                for field in fields {
                    write!(f, "{}", field)?;
                }
                f.write_str(")")
            }
            Type::DictEntry(key, value) => write!(f, "{{{}{}}}", key, value),
        }
    }
}

/// An ordered list of complete types, i.e. a message body signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature(Vec<Type>);

impl Signature {
    /// Parse a signature string. The empty string is the empty signature.
    pub fn parse(signature: &str) -> Result<Self, SignatureError> {
        let mut parser = Parser {
            source: signature,
            chars: signature.chars().collect(),
            pos: 0,
        };

        let mut types = Vec::new();
        while parser.pos < parser.chars.len() {
            types.push(parser.parse_one(0)?);
        }

        Ok(Self(types))
    }

    /// The empty signature.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Signature describing a concrete body.
    #[must_use]
    pub fn of(body: &[Value]) -> Self {
        Self(body.iter().map(Value::value_type).collect())
    }

    /// Complete types in order.
    #[must_use]
    pub fn types(&self) -> &[Type] {
        &self.0
    }

    /// Number of complete types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty signature.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check a body against this signature.
    ///
    /// # Errors
    ///
    /// `SignatureError::Mismatch` naming the first offending argument
    /// (1-based) or the count mismatch.
    pub fn check(&self, body: &[Value]) -> Result<(), SignatureError> {
        if body.len() != self.0.len() {
            return Err(SignatureError::Mismatch(format!(
                "expected {} argument(s) of signature \"{}\", got {} (\"{}\")",
                self.0.len(),
                self,
                body.len(),
                Signature::of(body)
            )));
        }

        for (index, (value, expected)) in body.iter().zip(&self.0).enumerate() {
            if !value.matches(expected) {
                return Err(SignatureError::Mismatch(format!(
                    "argument {}: expected type \"{}\", got \"{}\"",
                    index + 1,
                    expected,
                    value.value_type()
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.0 {
            write!(f, "{}", ty)?;
        }
        Ok(())
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn malformed(&self) -> SignatureError {
        SignatureError::Malformed(self.source.to_string())
    }

    fn parse_one(&mut self, depth: usize) -> Result<Type, SignatureError> {
        if depth > MAX_SIGNATURE_DEPTH {
            return Err(SignatureError::TooDeep(self.source.to_string()));
        }

        let Some(&code) = self.chars.get(self.pos) else {
            return Err(self.malformed());
        };
        self.pos += 1;

        match code {
            'b' => Ok(Type::Bool),
            'i' => Ok(Type::Int32),
            'u' => Ok(Type::UInt32),
            't' => Ok(Type::UInt64),
            'd' => Ok(Type::Double),
            's' => Ok(Type::Str),
            'o' => Ok(Type::ObjectPath),
            'v' => Ok(Type::Variant),
            'a' => {
                if self.chars.get(self.pos) == Some(&'{') {
                    self.pos += 1;
                    let key = self.parse_one(depth + 1)?;
                    if !key.is_basic() {
                        return Err(self.malformed());
                    }
                    let value = self.parse_one(depth + 1)?;
                    if self.chars.get(self.pos) != Some(&'}') {
                        return Err(self.malformed());
                    }
                    self.pos += 1;
                    Ok(Type::array_of(Type::DictEntry(
                        Box::new(key),
                        Box::new(value),
                    )))
                } else {
                    Ok(Type::array_of(self.parse_one(depth + 1)?))
                }
            }
            '(' => {
                let mut fields = Vec::new();
                loop {
                    match self.chars.get(self.pos) {
                        Some(')') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => fields.push(self.parse_one(depth + 1)?),
                        None => return Err(self.malformed()),
                    }
                }
                if fields.is_empty() {
                    return Err(self.malformed());
                }
                Ok(Type::Struct(fields))
            }
            ')' | '{' | '}' => Err(self.malformed()),
            other => Err(SignatureError::UnknownTypeCode {
                signature: self.source.to_string(),
                code: other,
                offset: self.pos - 1,
            }),
        }
    }
}
