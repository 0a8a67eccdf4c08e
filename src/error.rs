//! Munin error types

use std::time::Duration;

/// Munin error types
#[derive(Debug, thiserror::Error)]
pub enum MuninError {
    // Backend errors
    #[error("backend error ({backend}): {message}")]
    Backend { backend: String, message: String },

    #[error("connection error ({backend}): {message}")]
    Connection { backend: String, message: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// No healthy provider and no fallback backend.
    #[error("no cache backend available")]
    NoBackend,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported connection scheme: {0}")]
    UnsupportedScheme(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Hook errors
    #[error("hook handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },
}

impl MuninError {
    /// Build a [`MuninError::Backend`] from any displayable error.
    pub fn backend(backend: impl Into<String>, err: impl std::fmt::Display) -> Self {
        MuninError::Backend {
            backend: backend.into(),
            message: err.to_string(),
        }
    }

    /// Build a [`MuninError::Handler`] from any displayable error.
    pub fn handler(handler: impl Into<String>, err: impl std::fmt::Display) -> Self {
        MuninError::Handler {
            handler: handler.into(),
            message: err.to_string(),
        }
    }

    /// Whether the error comes from an unreachable or slow backend rather
    /// than from bad input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MuninError::Timeout { .. } | MuninError::Connection { .. } | MuninError::NoBackend
        )
    }
}

/// Result type alias for Munin operations
pub type Result<T> = std::result::Result<T, MuninError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let err = MuninError::Timeout {
            operation: "GET",
            timeout: Duration::from_secs(2),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "GET timed out after 2s");
    }

    #[test]
    fn backend_error_is_not_transient() {
        let err = MuninError::backend("local", "WRONGTYPE");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "backend error (local): WRONGTYPE");
    }
}
