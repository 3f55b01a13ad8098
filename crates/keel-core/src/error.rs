//! Typed errors for text parsing and wire decoding.
//!
//! Everything above the protocol boundary uses `anyhow`; these two enums exist
//! because callers need to tell a malformed constraint or a version-skewed
//! message apart from an I/O failure.

use thiserror::Error;

/// Malformed `Version` or `VersionRange` text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Illegal version '{input}': {reason}")]
    Version { input: String, reason: String },

    #[error("Illegal version range '{input}': {reason}")]
    Range { input: String, reason: String },
}

impl ParseError {
    pub(crate) fn version(input: &str, reason: impl Into<String>) -> Self {
        Self::Version {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn range(input: &str, reason: impl Into<String>) -> Self {
        Self::Range {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure to encode or decode a bus message.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Failed to encode {message} payload: {source}")]
    Encode {
        message: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed {message} payload: {source}")]
    Malformed {
        message: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown status code {code} for {message}")]
    UnknownStatus { message: &'static str, code: i32 },

    #[error("Unknown container resource location code {0}")]
    UnknownLocation(i32),

    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
