//! Daemon-specific error types

use libpostwatch_atproto::{ResolveError, XrpcError};
use libpostwatch_core::ConfigError;
use thiserror::Error;

/// Errors that stop the daemon before or instead of streaming
///
/// Transport and decode failures never show up here; the supervisor
/// recovers from those by reconnecting.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration missing or invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A watched handle could not be resolved
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Chat login failed
    #[error("Chat login failed: {0}")]
    ChatLogin(#[source] XrpcError),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(String),
}

impl DaemonError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            DaemonError::Config(_) => 2,
            DaemonError::Resolve(_) => 3,
            DaemonError::ChatLogin(_) => 4,
            DaemonError::Join(_) => 1,
        }
    }
}

impl From<tokio::task::JoinError> for DaemonError {
    fn from(e: tokio::task::JoinError) -> Self {
        DaemonError::Join(e.to_string())
    }
}
