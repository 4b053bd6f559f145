use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Did;
use crate::{
    DEFAULT_APPVIEW_URL, DEFAULT_FIREHOSE_URL, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_PDS_URL,
    DEFAULT_RECONNECT_DELAY_SECS, POST_COLLECTION,
};

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "postwatch.toml";

/// Daemon configuration, read from `postwatch.toml` and the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub firehose: FirehoseConfig,
    pub appview: AppviewConfig,
    pub bluesky: BlueskyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirehoseConfig {
    /// `subscribeRepos` WebSocket endpoint
    pub url: String,
    /// Record collection that triggers notifications
    pub collection: String,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay_secs: u64,
    /// Silence on an open connection before it is dropped and reconnected
    pub idle_timeout_secs: u64,
    /// Resume from the last seen sequence number after a reconnect
    pub resume_from_cursor: bool,
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FIREHOSE_URL.to_string(),
            collection: POST_COLLECTION.to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            resume_from_cursor: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppviewConfig {
    /// Public XRPC service for handle resolution and profile lookups
    pub url: String,
}

impl Default for AppviewConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_APPVIEW_URL.to_string(),
        }
    }
}

/// Credentials for direct-message delivery
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    pub pds_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_did: Option<String>,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            pds_url: DEFAULT_PDS_URL.to_string(),
            handle: None,
            password: None,
            recipient_did: None,
        }
    }
}

impl std::fmt::Debug for BlueskyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueskyConfig")
            .field("pds_url", &self.pds_url)
            .field("handle", &self.handle)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("recipient_did", &self.recipient_did)
            .finish()
    }
}

/// Validated chat delivery settings
#[derive(Clone)]
pub struct ChatCredentials {
    pub pds_url: String,
    pub handle: String,
    pub password: String,
    pub recipient: Did,
}

impl std::fmt::Debug for ChatCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCredentials")
            .field("pds_url", &self.pds_url)
            .field("handle", &self.handle)
            .field("recipient", &self.recipient)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit `path` must exist. Without one, `postwatch.toml` in the
    /// working directory is used if present. Environment variables override
    /// file values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from an environment-style lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("POSTWATCH_FIREHOSE_URL") {
            self.firehose.url = url;
        }
        if let Some(delay) = lookup("POSTWATCH_RECONNECT_DELAY_SECS") {
            self.firehose.reconnect_delay_secs =
                delay.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "firehose.reconnect_delay_secs",
                    reason: format!("'{delay}' is not a whole number of seconds"),
                })?;
        }
        if let Some(idle) = lookup("POSTWATCH_IDLE_TIMEOUT_SECS") {
            self.firehose.idle_timeout_secs =
                idle.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "firehose.idle_timeout_secs",
                    reason: format!("'{idle}' is not a whole number of seconds"),
                })?;
        }
        if let Some(url) = lookup("POSTWATCH_APPVIEW_URL") {
            self.appview.url = url;
        }
        if let Some(url) = lookup("BLUESKY_PDS_URL") {
            self.bluesky.pds_url = url;
        }
        if let Some(handle) = lookup("BLUESKY_HANDLE") {
            self.bluesky.handle = Some(handle);
        }
        if let Some(password) = lookup("BLUESKY_PASSWORD") {
            self.bluesky.password = Some(password);
        }
        if let Some(did) = lookup("BLUESKY_RECIPIENT_DID") {
            self.bluesky.recipient_did = Some(did);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.firehose.url.starts_with("wss://") && !self.firehose.url.starts_with("ws://") {
            return Err(ConfigError::Invalid {
                key: "firehose.url",
                reason: format!("'{}' is not a ws:// or wss:// URL", self.firehose.url),
            });
        }
        if self.firehose.collection.is_empty() || self.firehose.collection.contains('/') {
            return Err(ConfigError::Invalid {
                key: "firehose.collection",
                reason: format!("'{}' is not a collection NSID", self.firehose.collection),
            });
        }
        if self.firehose.reconnect_delay_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "firehose.reconnect_delay_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.firehose.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "firehose.idle_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        for (key, url) in [
            ("appview.url", &self.appview.url),
            ("bluesky.pds_url", &self.bluesky.pds_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("'{url}' is not an http(s) URL"),
                });
            }
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.firehose.reconnect_delay_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.firehose.idle_timeout_secs)
    }

    /// Credentials required for direct-message delivery
    pub fn chat_credentials(&self) -> Result<ChatCredentials, ConfigError> {
        let handle = self
            .bluesky
            .handle
            .clone()
            .ok_or(ConfigError::Missing("bluesky.handle (BLUESKY_HANDLE)"))?;
        let password = self
            .bluesky
            .password
            .clone()
            .ok_or(ConfigError::Missing("bluesky.password (BLUESKY_PASSWORD)"))?;
        let recipient = self
            .bluesky
            .recipient_did
            .as_deref()
            .ok_or(ConfigError::Missing(
                "bluesky.recipient_did (BLUESKY_RECIPIENT_DID)",
            ))?;
        let recipient = Did::parse(recipient).map_err(|e| ConfigError::Invalid {
            key: "bluesky.recipient_did",
            reason: e.to_string(),
        })?;

        Ok(ChatCredentials {
            pds_url: self.bluesky.pds_url.clone(),
            handle,
            password,
            recipient,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.reconnect_delay(), Duration::from_secs(10));
        assert_eq!(config.firehose.collection, "app.bsky.feed.post");
        assert!(config.firehose.resume_from_cursor);
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_idle_timeout_env_and_validation() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[("POSTWATCH_IDLE_TIMEOUT_SECS", "15")]))
            .unwrap();
        assert_eq!(config.idle_timeout(), Duration::from_secs(15));

        config.firehose.idle_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "firehose.idle_timeout_secs", .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[
                ("POSTWATCH_RECONNECT_DELAY_SECS", "3"),
                ("BLUESKY_HANDLE", "bot.example.com"),
                ("BLUESKY_PASSWORD", "app-password"),
                ("BLUESKY_RECIPIENT_DID", "did:plc:me"),
            ]))
            .unwrap();

        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        let creds = config.chat_credentials().unwrap();
        assert_eq!(creds.handle, "bot.example.com");
        assert_eq!(creds.recipient.as_str(), "did:plc:me");
        assert_eq!(creds.pds_url, DEFAULT_PDS_URL);
    }

    #[test]
    fn test_bad_delay_env() {
        let mut config = Config::default();
        let err = config
            .apply_env_from(env(&[("POSTWATCH_RECONNECT_DELAY_SECS", "ten")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "config_invalid");
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[("BLUESKY_HANDLE", "bot.example.com")]))
            .unwrap();

        let err = config.chat_credentials().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(key) if key.starts_with("bluesky.password")));
        assert!(!err.suggestions().is_empty());
    }

    #[test]
    fn test_invalid_recipient() {
        let mut config = Config::default();
        config.bluesky.handle = Some("bot.example.com".to_string());
        config.bluesky.password = Some("pw".to_string());
        config.bluesky.recipient_did = Some("someone".to_string());
        assert!(matches!(
            config.chat_credentials(),
            Err(ConfigError::Invalid { key: "bluesky.recipient_did", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.firehose.url = "https://bsky.network".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.firehose.reconnect_delay_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.firehose.collection = "app.bsky.feed.post/x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let mut config = Config::default();
        config.bluesky.password = Some("hunter2".to_string());
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
