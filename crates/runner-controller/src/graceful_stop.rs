//! # Runner graceful stop
//!
//! Deleting a runner pod while GitHub still considers the runner registered can
//! leave a job assigned to a runner that no longer exists. The graceful stop
//! only lets the pod go once the registration is gone, or once the
//! unregistration timeout has passed since the stop began.
//!
//! It is a "tick" operation: each call does as much as it can without waiting
//! and otherwise asks to be called again later via a [`RetrySignal`]. Progress
//! is kept in pod annotations, so every tick is safe to repeat.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GracefulStopConfig;
use crate::error::{Error, Result};
use crate::github::{unregister_runner, RunnerRegistry, Unregistration};
use crate::pod::{
    get_annotation, runner_pod_or_container_is_stopped, set_annotation_if_absent,
    AnnotationWrite, PodPatcher, UNREGISTRATION_COMPLETE_TIMESTAMP, UNREGISTRATION_START_TIMESTAMP,
};
use crate::scope::RunnerScope;

/// Request to tick again no sooner than `after`
#[derive(Debug)]
pub struct RetrySignal {
    pub after: Duration,
    /// The failure that caused the retry, if any
    pub error: Option<Error>,
}

impl RetrySignal {
    #[must_use]
    pub fn after(after: Duration) -> Self {
        Self { after, error: None }
    }

    #[must_use]
    pub fn with_error(after: Duration, error: Error) -> Self {
        Self {
            after,
            error: Some(error),
        }
    }

    /// Requeue action for controllers built on the kube runtime
    #[must_use]
    pub fn action(&self) -> Action {
        Action::requeue(self.after)
    }
}

/// Result of a graceful stop tick
#[derive(Debug)]
pub enum TickOutcome {
    /// The runner can no longer receive jobs and the pod may be deleted.
    ///
    /// Holds the pod with both progress annotations, or `None` when no pod
    /// was given.
    SafeToDelete(Option<Pod>),

    /// The pod must not be deleted yet
    Retry(RetrySignal),
}

/// Graceful stop of runner pods
#[derive(Clone)]
pub struct GracefulStop {
    registry: Arc<dyn RunnerRegistry>,
    patcher: Arc<dyn PodPatcher>,
    config: GracefulStopConfig,
}

impl GracefulStop {
    #[must_use]
    pub fn new(
        registry: Arc<dyn RunnerRegistry>,
        patcher: Arc<dyn PodPatcher>,
        config: GracefulStopConfig,
    ) -> Self {
        Self {
            registry,
            patcher,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GracefulStopConfig {
        &self.config
    }

    /// Advance the graceful stop of a runner by one step.
    ///
    /// Returns [`TickOutcome::SafeToDelete`] once the pod can be deleted and
    /// [`TickOutcome::Retry`] while it cannot. An `Err` means a progress
    /// annotation could not be written; treat it as a retry without delay.
    pub async fn tick(
        &self,
        scope: &RunnerScope,
        runner: &str,
        pod: Option<Pod>,
    ) -> Result<TickOutcome> {
        self.tick_at(Utc::now(), scope, runner, pod).await
    }

    /// [`GracefulStop::tick`] with an explicit current time
    #[instrument(
        skip(self, now, pod),
        fields(runner = %runner, scope = %scope, pod = ?pod.as_ref().map(|pod| pod.name_any()))
    )]
    pub async fn tick_at(
        &self,
        now: DateTime<Utc>,
        scope: &RunnerScope,
        runner: &str,
        pod: Option<Pod>,
    ) -> Result<TickOutcome> {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);

        let pod = match pod {
            Some(pod) => Some(
                self.mark(pod, UNREGISTRATION_START_TIMESTAMP, &timestamp, "started")
                    .await?,
            ),
            None => None,
        };

        if let Some(signal) = ensure_runner_unregistration(
            self.registry.as_ref(),
            &self.config,
            scope,
            runner,
            pod.as_ref(),
            now,
        )
        .await
        {
            return Ok(TickOutcome::Retry(signal));
        }

        let pod = match pod {
            Some(pod) => Some(
                self.mark(pod, UNREGISTRATION_COMPLETE_TIMESTAMP, &timestamp, "completed")
                    .await?,
            ),
            None => None,
        };

        Ok(TickOutcome::SafeToDelete(pod))
    }

    async fn mark(&self, pod: Pod, key: &str, timestamp: &str, stage: &str) -> Result<Pod> {
        match set_annotation_if_absent(self.patcher.as_ref(), &pod, key, timestamp).await {
            Ok(AnnotationWrite::Present(pod)) => {
                info!("Runner has already {stage} unregistration");
                Ok(pod)
            }
            Ok(AnnotationWrite::Written(updated)) => {
                info!("Runner has {stage} unregistration");
                Ok(updated)
            }
            Err(e) => {
                error!(error = %e, "Failed to patch pod to have {key} annotation");
                Err(e)
            }
        }
    }
}

/// Decide whether the runner pod can be deleted now.
///
/// `None` means it is safe to delete the pod. Otherwise the returned signal
/// says when to check again and carries the error that prevented a decision,
/// if there was one.
pub async fn ensure_runner_unregistration(
    registry: &dyn RunnerRegistry,
    config: &GracefulStopConfig,
    scope: &RunnerScope,
    runner: &str,
    pod: Option<&Pod>,
    now: DateTime<Utc>,
) -> Option<RetrySignal> {
    // A previous tick already decided; the runner won't come back, so skip the API.
    if pod.is_some_and(|pod| get_annotation(pod, UNREGISTRATION_COMPLETE_TIMESTAMP).is_some()) {
        info!("Runner pod is marked as already unregistered");
        return None;
    }

    let unregistration = match unregister_runner(registry, scope, runner).await {
        Ok(unregistration) => unregistration,
        Err(e) => {
            let err = Error::from(e);

            if err.is_rate_limited() {
                let delay = config.rate_limit_retry_delay();
                error!(
                    error = %err,
                    "Failed to unregister runner due to GitHub API rate limits. Delaying retry for {delay:?} to avoid excessive GitHub API calls"
                );
                return Some(RetrySignal::with_error(delay, err));
            }

            error!(error = %err, "Failed to unregister runner before deleting the pod");
            return Some(RetrySignal::with_error(Duration::ZERO, err));
        }
    };

    match (unregistration, pod) {
        (Unregistration::Removed { runner_id }, _) => {
            info!(runner_id, "Runner has just been unregistered. Removing the runner pod");
            None
        }
        (Unregistration::NotFound, None) => {
            // No pod means the runner was never started, so it will never register.
            info!("Runner was not found on GitHub and the runner pod was not found on Kubernetes");
            None
        }
        (Unregistration::NotFound, Some(pod)) => resolve_missing_registration(config, pod, now),
    }
}

/// The runner is not registered but a pod exists: it may have deregistered
/// itself, or it may be about to register.
fn resolve_missing_registration(
    config: &GracefulStopConfig,
    pod: &Pod,
    now: DateTime<Utc>,
) -> Option<RetrySignal> {
    if runner_pod_or_container_is_stopped(pod, &config.runner_container_name) {
        info!("Runner pod has been stopped with a successful status");
        return None;
    }

    let Some(started) = get_annotation(pod, UNREGISTRATION_START_TIMESTAMP) else {
        // Pods created before the start annotation existed end up here once.
        debug!("Runner unregistration is being retried later");
        return Some(RetrySignal::after(config.retry_delay()));
    };

    let started_at = match DateTime::parse_from_rfc3339(started) {
        Ok(started_at) => started_at.with_timezone(&Utc),
        Err(source) => {
            let err = Error::InvalidMarker {
                key: UNREGISTRATION_START_TIMESTAMP.to_string(),
                value: started.to_string(),
                source,
            };
            warn!(error = %err, "Cannot tell how long unregistration has been running");
            return Some(RetrySignal::with_error(config.retry_delay(), err));
        }
    };

    let timeout = config.unregistration_timeout();
    let deadline = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| started_at.checked_add_signed(timeout));

    match deadline {
        Some(deadline) if now >= deadline => {
            info!(
                timeout = ?timeout,
                "Runner unregistration has timed out. The runner pod will be deleted soon"
            );
            None
        }
        _ => {
            let remaining = deadline.and_then(|deadline| (deadline - now).to_std().ok());
            info!(
                timeout = ?timeout,
                remaining = ?remaining,
                "Runner unregistration is in progress"
            );
            Some(RetrySignal::after(config.retry_delay()))
        }
    }
}
