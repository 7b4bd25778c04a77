//! Runner registrations as seen by GitHub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::GitHubError;
use crate::scope::RunnerScope;

/// A self-hosted runner registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub status: String,
}

/// Access to the runner registrations of a scope
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunnerRegistry: Send + Sync {
    /// List every runner currently registered in the scope
    async fn list_runners(&self, scope: &RunnerScope) -> Result<Vec<Runner>, GitHubError>;

    /// Remove a runner registration by ID
    async fn remove_runner(&self, scope: &RunnerScope, runner_id: i64) -> Result<(), GitHubError>;
}

/// Result of an unregistration attempt that reached GitHub without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistration {
    /// The runner was registered and has just been removed
    Removed { runner_id: i64 },

    /// No runner with the name is registered.
    ///
    /// This cannot tell apart a runner that already unregistered, one that will
    /// never register, and one that has not registered yet. Callers resolve it
    /// with state they keep themselves.
    NotFound,
}

/// Unregister a runner from GitHub Actions by name.
///
/// The runner is removed without checking its busy flag first: GitHub refuses
/// to remove a runner that is running a job, and that refusal comes back as
/// [`GitHubError::RunnerBusy`].
pub async fn unregister_runner(
    registry: &dyn RunnerRegistry,
    scope: &RunnerScope,
    name: &str,
) -> Result<Unregistration, GitHubError> {
    let runners = registry.list_runners(scope).await?;

    // An ID of 0 is not a registration.
    let Some(runner) = runners
        .iter()
        .find(|runner| runner.name == name && runner.id != 0)
    else {
        debug!(
            runner = %name,
            scope = %scope,
            "Runner not found among {} registrations",
            runners.len()
        );
        return Ok(Unregistration::NotFound);
    };

    if let Err(e) = registry.remove_runner(scope, runner.id).await {
        warn!(
            runner = %name,
            runner_id = runner.id,
            busy = runner.busy,
            scope = %scope,
            error = %e,
            "Failed to remove runner registration"
        );
        return Err(e);
    }

    info!(
        runner = %name,
        runner_id = runner.id,
        busy = runner.busy,
        scope = %scope,
        "Removed runner registration"
    );

    Ok(Unregistration::Removed {
        runner_id: runner.id,
    })
}
