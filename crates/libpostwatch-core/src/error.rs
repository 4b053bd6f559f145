use thiserror::Error;

/// Errors produced while decoding a firehose frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame {part} is not valid CBOR: {reason}")]
    Cbor { part: &'static str, reason: String },

    #[error("malformed frame header: {0}")]
    Header(String),

    #[error("unknown frame op {0}")]
    UnknownOp(i64),

    #[error("malformed {kind} body: {reason}")]
    Body { kind: String, reason: String },

    #[error("relay sent error frame {error}: {}", .message.as_deref().unwrap_or("no message"))]
    ErrorFrame {
        error: String,
        message: Option<String>,
    },
}

impl DecodeError {
    pub(crate) fn body(kind: &str, reason: impl Into<String>) -> Self {
        DecodeError::Body {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the relay itself ended the stream, as opposed to sending bytes we could not parse
    pub fn is_remote(&self) -> bool {
        matches!(self, DecodeError::ErrorFrame { .. })
    }
}

/// Configuration loading and validation errors
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Get the error code for log output
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::Missing(_) => "config_missing",
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::Io(_) => "io_error",
            ConfigError::TomlParse(_) => "config_invalid",
        }
    }

    /// Get actionable suggestions for fixing the error
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            ConfigError::Missing(_) => vec![
                "Set the value in postwatch.toml or via its BLUESKY_* environment variable",
                "Or pass --dry-run to print matches without sending direct messages",
            ],
            ConfigError::TomlParse(_) => vec!["Check postwatch.toml for syntax errors"],
            _ => vec![],
        }
    }
}
