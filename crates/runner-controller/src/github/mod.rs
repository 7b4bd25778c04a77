//! GitHub Actions self-hosted runner API integration

pub mod client;
pub mod registry;

use std::time::Duration;

use thiserror::Error;

pub use client::{GitHubConfig, GitHubRunnerClient};
pub use registry::{unregister_runner, Runner, RunnerRegistry, Unregistration};

/// Errors returned by the runner API
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("GitHub API rate limit exceeded, reset in {reset_in:?}")]
    RateLimited { reset_in: Duration },

    #[error("Runner is still running a job: {message}")]
    RunnerBusy { message: String },

    #[error("Missing configuration: {0}")]
    NotConfigured(String),
}
