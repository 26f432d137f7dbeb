//! Error types for confbot.
//!
//! Library crates use [`ConfbotError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all confbot operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfbotError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a page or the feed.
    #[error("network error: {0}")]
    Network(String),

    /// JSON or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Cache store error that is not a plain filesystem failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// LLM provider transport or API error.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider answered, but with no usable content.
    #[error("empty response from provider")]
    EmptyResponse,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, bad key encoding, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ConfbotError>;

impl ConfbotError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the provider returned nothing usable,
    /// as opposed to failing outright.
    pub fn is_empty_response(&self) -> bool {
        matches!(self, Self::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ConfbotError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ConfbotError::validation("url has no host");
        assert!(err.to_string().contains("no host"));
    }

    #[test]
    fn empty_response_is_distinct_from_provider_error() {
        assert!(ConfbotError::EmptyResponse.is_empty_response());
        assert!(!ConfbotError::Provider("HTTP 502".into()).is_empty_response());
    }

    #[test]
    fn io_error_carries_path() {
        let err = ConfbotError::io(
            "/tmp/cache/raw-html",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("raw-html"));
    }
}
