//! XRPC clients for postwatch
//!
//! This crate provides:
//! - A small blocking XRPC client (queries and procedures over HTTP)
//! - Handle-to-DID resolution and target set construction
//! - Profile lookups for display handles
//! - Bluesky chat direct-message delivery
//!
//! All calls block; async callers should run them on a blocking thread.

pub mod chat;
pub mod error;
pub mod identity;
pub mod profile;
pub mod xrpc;

#[cfg(test)]
mod test_server;

pub use chat::{ChatClient, LinkMessage};
pub use error::{ResolveError, XrpcError};
pub use identity::{resolve_target_set, ResolveHandle, XrpcIdentityResolver};
pub use profile::ProfileClient;
pub use xrpc::XrpcClient;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("postwatch/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Service proxy header value routing requests to the Bluesky chat service
pub const CHAT_PROXY: &str = "did:web:api.bsky.chat#bsky_chat";
