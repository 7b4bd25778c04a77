//! Error types for the runner controller.

use std::time::Duration;

use kube::runtime::controller::Action;
use thiserror::Error;

use crate::github::GitHubError;

/// Errors surfaced by the graceful stop machinery.
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The pod changed between read and patch
    #[error("Pod {pod} was modified concurrently, patch rejected")]
    PatchConflict { pod: String },

    /// GitHub runner API error
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// A progress annotation holds something other than an RFC3339 timestamp
    #[error("Invalid timestamp '{value}' in annotation {key}: {source}")]
    InvalidMarker {
        key: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Not exactly one of enterprise, organization and repository was given
    #[error("Invalid runner scope: {0}")]
    InvalidScope(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for runner controller operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Check if the error is a GitHub API rate limit rejection
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::GitHub(GitHubError::RateLimited { .. }))
    }

    /// Requeue action for a tick that failed before producing a retry signal.
    ///
    /// Such failures are retried immediately; backoff is left to the caller's
    /// scheduler.
    #[must_use]
    pub fn requeue_action(&self) -> Action {
        Action::requeue(Duration::ZERO)
    }
}
