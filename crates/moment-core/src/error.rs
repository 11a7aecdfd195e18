//! Error types for moment-core
//!
//! Errors fall in two groups:
//! - Local errors (`Unauthenticated`, `ValidationFailed`) are raised before
//!   any optimistic change is made
//! - Remote errors (`RemoteRejected`) are raised after the optimistic change
//!   has already been rolled back

use std::path::PathBuf;

/// Error surfaced by the optimistic controllers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// No signed-in identity; the operation never started
    #[error("you must be logged in")]
    Unauthenticated,

    /// Payload rejected locally; the operation never started
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The remote store refused the write; the optimistic change was undone
    #[error("{0}")]
    RemoteRejected(#[from] RemoteError),

    /// The reconciliation task did not run to completion
    #[error("reconciliation aborted: {0}")]
    Aborted(String),
}

impl MutationError {
    /// Check if the error was raised before any optimistic change
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::ValidationFailed(_))
    }

    /// Check if the error came back from the remote store
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteRejected(_))
    }

    /// Message suitable for inline display next to the input
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::RemoteRejected(remote) => remote.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Error returned by a [`RemoteMutationService`](crate::remote::RemoteMutationService)
///
/// Network, permission and constraint failures are not told apart; the raw
/// message and the optional backend code are kept for display.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Raw message from the backend
    pub message: String,
    /// Backend error code, e.g. `23505` for a unique violation
    pub code: Option<String>,
}

impl RemoteError {
    /// Create a remote error without a code
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a backend error code
    #[inline]
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Check for a unique constraint violation
    #[inline]
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION)
    }
}

/// Postgres SQLSTATE for `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`MomentConfig`](crate::config::MomentConfig)
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config parsed but holds an unusable value
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}
