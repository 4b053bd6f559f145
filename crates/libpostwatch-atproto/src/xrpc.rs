//! Minimal blocking XRPC client

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::XrpcError;
use crate::{DEFAULT_TIMEOUT_MS, USER_AGENT};

/// Body of an XRPC error response
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Blocking XRPC client bound to one service
#[derive(Clone)]
pub struct XrpcClient {
    agent: ureq::Agent,
    base_url: String,
}

impl XrpcClient {
    /// Create a client for `base_url` (e.g. `https://public.api.bsky.app`)
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(USER_AGENT)
            .build();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, nsid)
    }

    /// Call an XRPC query (HTTP GET)
    pub fn query<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<T, XrpcError> {
        let mut req = self.agent.get(&self.endpoint(nsid));
        for (name, value) in params {
            req = req.query(name, value);
        }
        for (name, value) in headers {
            req = req.set(name, value);
        }

        let response = req.call().map_err(|e| from_ureq(nsid, e))?;
        read_json(nsid, response)
    }

    /// Call an XRPC procedure (HTTP POST with a JSON body)
    pub fn procedure<B: Serialize, T: DeserializeOwned>(
        &self,
        nsid: &str,
        body: &B,
        headers: &[(&str, &str)],
    ) -> Result<T, XrpcError> {
        let mut req = self
            .agent
            .post(&self.endpoint(nsid))
            .set("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.set(name, value);
        }

        let response = req.send_json(body).map_err(|e| from_ureq(nsid, e))?;
        read_json(nsid, response)
    }
}

fn read_json<T: DeserializeOwned>(nsid: &str, response: ureq::Response) -> Result<T, XrpcError> {
    response
        .into_json::<T>()
        .map_err(|e| XrpcError::InvalidBody {
            nsid: nsid.to_string(),
            reason: e.to_string(),
        })
}

fn from_ureq(nsid: &str, err: ureq::Error) -> XrpcError {
    match err {
        ureq::Error::Status(status, response) => {
            let body: ErrorBody = response.into_json().unwrap_or_default();
            XrpcError::Status {
                nsid: nsid.to_string(),
                status,
                error: body.error,
                message: body.message,
            }
        }
        ureq::Error::Transport(transport) => XrpcError::Transport {
            nsid: nsid.to_string(),
            reason: transport.to_string(),
        },
    }
}
