//! XRPC error types

use libpostwatch_core::{Handle, IdParseError};
use thiserror::Error;

/// Errors from a single XRPC call
#[derive(Error, Debug)]
pub enum XrpcError {
    /// Server answered with a non-2xx status
    #[error("XRPC {nsid} failed with HTTP {status}{}", describe(.error, .message))]
    Status {
        nsid: String,
        status: u16,
        error: Option<String>,
        message: Option<String>,
    },

    /// Request never got a response (DNS, TLS, timeout, connection reset)
    #[error("XRPC {nsid} transport error: {reason}")]
    Transport { nsid: String, reason: String },

    /// Response body did not match the expected shape
    #[error("XRPC {nsid} returned an unexpected body: {reason}")]
    InvalidBody { nsid: String, reason: String },
}

impl XrpcError {
    /// XRPC error name from the response body (e.g. `ExpiredToken`)
    pub fn error_name(&self) -> Option<&str> {
        match self {
            XrpcError::Status { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            XrpcError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn describe(error: &Option<String>, message: &Option<String>) -> String {
    match (error, message) {
        (Some(e), Some(m)) => format!(" ({e}: {m})"),
        (Some(e), None) => format!(" ({e})"),
        (None, Some(m)) => format!(" ({m})"),
        (None, None) => String::new(),
    }
}

/// Handle resolution failures
///
/// Any of these during startup is a configuration error.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The service does not know the handle
    #[error("handle @{handle} does not exist: {reason}")]
    NotFound { handle: Handle, reason: String },

    /// The resolution service could not be reached or failed
    #[error("could not resolve @{handle}: {source}")]
    Unreachable {
        handle: Handle,
        #[source]
        source: XrpcError,
    },

    /// The service returned something that is not a DID
    #[error("service returned an invalid DID for @{handle}: {source}")]
    InvalidDid {
        handle: Handle,
        #[source]
        source: IdParseError,
    },

    /// No handles were given
    #[error("no handles to resolve")]
    NoHandles,
}

impl ResolveError {
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            ResolveError::NotFound { handle, .. }
            | ResolveError::Unreachable { handle, .. }
            | ResolveError::InvalidDid { handle, .. } => Some(handle),
            ResolveError::NoHandles => None,
        }
    }
}
