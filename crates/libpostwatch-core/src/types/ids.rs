use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("invalid DID '{0}': expected did:<method>:<id>")]
    InvalidDid(String),
    #[error("invalid handle '{0}': expected a domain name such as alice.bsky.social")]
    InvalidHandle(String),
}

/// Stable repository identifier (e.g. `did:plc:abc123`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse a DID, checking the `did:<method>:<id>` shape
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next();
        let method = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();

        let method_ok = !method.is_empty()
            && method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let id_ok = !id.is_empty() && !id.chars().any(char::is_whitespace);

        if scheme == Some("did") && method_ok && id_ok {
            Ok(Self(s.to_string()))
        } else {
            Err(IdParseError::InvalidDid(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Did::parse(&s)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

/// Human-readable account name (e.g. `alice.bsky.social`)
///
/// Handles are case-insensitive; the stored form is lowercase with any
/// leading `@` removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let normalized = s.trim().trim_start_matches('@').to_ascii_lowercase();

        let valid = normalized.contains('.')
            && !normalized.starts_with('.')
            && !normalized.ends_with('.')
            && !normalized.contains("..")
            && normalized
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

        if valid {
            Ok(Self(normalized))
        } else {
            Err(IdParseError::InvalidHandle(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Handle {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Handle::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_parse_valid() {
        let did = Did::parse("did:plc:abc123").unwrap();
        assert_eq!(did.as_str(), "did:plc:abc123");

        let did = Did::parse("did:web:example.com").unwrap();
        assert_eq!(did.to_string(), "did:web:example.com");
    }

    #[test]
    fn test_did_parse_invalid() {
        for bad in ["", "plc:abc", "did:", "did:plc", "did:plc:", "did:PLC:abc", "did:plc:a b"] {
            assert!(
                matches!(Did::parse(bad), Err(IdParseError::InvalidDid(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_handle_normalization() {
        let handle = Handle::parse("@Alice.Bsky.Social").unwrap();
        assert_eq!(handle.as_str(), "alice.bsky.social");
    }

    #[test]
    fn test_handle_invalid() {
        for bad in ["alice", "", ".alice.com", "alice.com.", "ali ce.com", "a..b"] {
            assert!(Handle::parse(bad).is_err(), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn test_did_serde_rejects_invalid() {
        let ok: Did = toml::from_str::<std::collections::HashMap<String, Did>>("d = \"did:plc:x\"")
            .unwrap()
            .remove("d")
            .unwrap();
        assert_eq!(ok.as_str(), "did:plc:x");

        let bad = toml::from_str::<std::collections::HashMap<String, Did>>("d = \"nope\"");
        assert!(bad.is_err());
    }
}
