/*
 * 5D Labs Agent Platform - Runner Drain
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Runner Drain - gracefully stop a single runner pod
//!
//! Unregisters the runner from GitHub Actions and deletes its pod once no job
//! can be assigned to it anymore, ticking the graceful stop until it completes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams};
use runner_controller::{
    telemetry, GitHubConfig, GitHubRunnerClient, GracefulStop, GracefulStopConfig,
    KubePodPatcher, RunnerScope, TickOutcome,
};
use tokio::signal;
use tracing::{error, info, warn};

/// Lower bound between ticks so immediate retries don't spin
const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "runner-drain", version, about = "Gracefully stop a GitHub Actions runner pod")]
struct Args {
    /// Namespace of the runner pod
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Name of the runner pod
    #[arg(long)]
    pod: String,

    /// Runner name registered with GitHub (defaults to the pod name)
    #[arg(long)]
    runner: Option<String>,

    /// Enterprise the runner is registered to
    #[arg(long, env = "RUNNER_ENTERPRISE")]
    enterprise: Option<String>,

    /// Organization the runner is registered to
    #[arg(long, env = "RUNNER_ORG")]
    organization: Option<String>,

    /// Repository (owner/repo) the runner is registered to
    #[arg(long, env = "RUNNER_REPO")]
    repository: Option<String>,

    /// Graceful stop configuration file
    #[arg(long, default_value = "/config/graceful-stop.yaml")]
    config: String,

    /// Unregister and annotate, but leave the pod in place
    #[arg(long)]
    dry_run: bool,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON")]
    json_logs: bool,
}

fn load_config(path: &str) -> Result<GracefulStopConfig> {
    let config = match GracefulStopConfig::from_mounted_file(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {}", e);
            GracefulStopConfig::default()
        }
    };

    config.validate().context("Invalid graceful stop configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.json_logs);

    info!(
        "Starting runner drain v{} for pod {}/{}",
        env!("CARGO_PKG_VERSION"),
        args.namespace,
        args.pod
    );

    let scope = RunnerScope::from_parts(
        args.enterprise.as_deref(),
        args.organization.as_deref(),
        args.repository.as_deref(),
    )?;
    let runner = args.runner.clone().unwrap_or_else(|| args.pod.clone());
    let config = load_config(&args.config)?;

    let client = kube::Client::try_default()
        .await
        .context("Failed to connect to Kubernetes")?;
    let github = GitHubRunnerClient::new(GitHubConfig::from_env()?)?;

    let graceful_stop = GracefulStop::new(
        Arc::new(github),
        Arc::new(KubePodPatcher::new(client.clone())),
        config,
    );
    let pods: Api<Pod> = Api::namespaced(client, &args.namespace);

    loop {
        let pod = pods
            .get_opt(&args.pod)
            .await
            .with_context(|| format!("Failed to get pod {}", args.pod))?;

        let outcome = tokio::select! {
            outcome = graceful_stop.tick(&scope, &runner, pod) => outcome,
            _ = signal::ctrl_c() => {
                warn!("Interrupted, runner pod left in place");
                return Ok(());
            }
        };

        let delay = match outcome {
            Ok(TickOutcome::SafeToDelete(Some(pod))) => {
                if args.dry_run {
                    info!("Runner pod {} is safe to delete (dry run)", args.pod);
                } else {
                    pods.delete(&args.pod, &DeleteParams::default())
                        .await
                        .with_context(|| format!("Failed to delete pod {}", args.pod))?;
                    info!(
                        resource_version = ?pod.metadata.resource_version,
                        "Deleted runner pod {}", args.pod
                    );
                }
                return Ok(());
            }
            Ok(TickOutcome::SafeToDelete(None)) => {
                info!("Runner {} is unregistered and pod {} no longer exists", runner, args.pod);
                return Ok(());
            }
            Ok(TickOutcome::Retry(retry)) => {
                if let Some(e) = &retry.error {
                    warn!(error = %e, "Graceful stop not finished, retrying in {:?}", retry.after);
                }
                retry.after
            }
            Err(e) => {
                error!(error = %e, "Graceful stop tick failed");
                Duration::ZERO
            }
        };

        tokio::select! {
            () = tokio::time::sleep(delay.max(MIN_TICK_INTERVAL)) => {}
            _ = signal::ctrl_c() => {
                warn!("Interrupted, runner pod left in place");
                return Ok(());
            }
        }
    }
}
