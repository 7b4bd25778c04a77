/*
 * 5D Labs Agent Platform - Runner Controller
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

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Runner controller core library
//!
//! Graceful stop of ephemeral GitHub Actions runner pods: a runner pod is only
//! deleted once GitHub no longer considers the runner able to receive a job, or
//! once a bounded grace period has elapsed. Progress is recorded as pod
//! annotations so that the stop survives controller restarts.

pub mod config;
pub mod error;
pub mod github;
pub mod graceful_stop;
pub mod pod;
pub mod scope;
pub mod telemetry;

// Re-export commonly used types
pub use config::GracefulStopConfig;
pub use error::{Error, Result};
pub use github::{GitHubConfig, GitHubError, GitHubRunnerClient, Runner, RunnerRegistry};
pub use graceful_stop::{GracefulStop, RetrySignal, TickOutcome};
pub use pod::annotations::{KubePodPatcher, PodPatcher};
pub use scope::RunnerScope;
