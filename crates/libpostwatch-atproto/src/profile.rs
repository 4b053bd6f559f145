//! Profile lookups

use libpostwatch_core::Did;
use serde::Deserialize;

use crate::error::XrpcError;
use crate::xrpc::XrpcClient;

const GET_PROFILE: &str = "app.bsky.actor.getProfile";

#[derive(Deserialize)]
struct ProfileView {
    handle: String,
}

/// Looks up the current handle of an account on a public AppView
#[derive(Clone)]
pub struct ProfileClient {
    client: XrpcClient,
}

impl ProfileClient {
    pub fn new(client: XrpcClient) -> Self {
        Self { client }
    }

    /// Current handle for `did`
    pub fn handle_of(&self, did: &Did) -> Result<String, XrpcError> {
        let profile: ProfileView = self
            .client
            .query(GET_PROFILE, &[("actor", did.as_str())], &[])?;
        Ok(profile.handle)
    }
}
