//! # Bus Errors
//!
//! Transport and signature errors. Protocol-level faults (the ones returned to
//! callers) live in the gateway; these are the plumbing failures beneath them.

use crate::connection::ConnectionId;
use thiserror::Error;

/// Errors from sending a message on a connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The remote end is gone.
    #[error("connection {0} is closed")]
    Disconnected(ConnectionId),

    /// The transport refused the message.
    #[error("transport rejected message: {0}")]
    Rejected(String),
}

/// Errors from parsing signatures or validating typed values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Unknown type code in a signature string.
    #[error("unknown type code '{code}' at offset {offset} in \"{signature}\"")]
    UnknownTypeCode {
        signature: String,
        code: char,
        offset: usize,
    },

    /// Unbalanced or truncated container.
    #[error("malformed signature \"{0}\"")]
    Malformed(String),

    /// Containers nested deeper than [`crate::MAX_SIGNATURE_DEPTH`].
    #[error("signature \"{0}\" nests too deeply")]
    TooDeep(String),

    /// Body did not match the declared signature.
    #[error("{0}")]
    Mismatch(String),

    /// Object path does not follow path syntax.
    #[error("invalid object path \"{0}\"")]
    InvalidObjectPath(String),
}
