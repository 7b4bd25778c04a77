//! # GitHub Runner API Client
//!
//! REST client for the self-hosted runner endpoints of enterprises,
//! organizations and repositories. Failures are classified so that callers can
//! tell a rate limit rejection and a busy runner apart from other errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client as HttpClient, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::registry::{Runner, RunnerRegistry};
use super::GitHubError;
use crate::scope::RunnerScope;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const DEFAULT_USER_AGENT: &str = "cto-runner-controller/1.0";
const RUNNERS_PER_PAGE: usize = 100;

/// Used when GitHub signals a rate limit without saying when it resets
const FALLBACK_RATE_LIMIT_RESET: Duration = Duration::from_secs(60);

/// Connection settings for the GitHub API
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API root, e.g. `https://api.github.com` or `https://ghe.example.com/api/v3`
    pub base_url: String,
    pub token: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl GitHubConfig {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Read `GITHUB_TOKEN` and, optionally, `GITHUB_API_URL` from the environment
    pub fn from_env() -> Result<Self, GitHubError> {
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| GitHubError::NotConfigured("GITHUB_TOKEN is not set".to_string()))?;

        let mut config = Self::new(token);
        if let Ok(base_url) = std::env::var("GITHUB_API_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url;
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RunnerPage {
    total_count: usize,
    runners: Vec<Runner>,
}

/// GitHub API client for runner registrations
#[derive(Clone)]
pub struct GitHubRunnerClient {
    http_client: HttpClient,
    base_url: String,
    token: String,
}

impl GitHubRunnerClient {
    /// Create a new runner API client
    pub fn new(config: GitHubConfig) -> Result<Self, GitHubError> {
        let http_client = HttpClient::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn runners_url(&self, scope: &RunnerScope) -> String {
        format!("{}/{}/actions/runners", self.base_url, scope.api_path())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, GitHubError> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;

        if let Some(reset_in) = rate_limit_reset(&response) {
            warn!(
                status = %response.status(),
                "GitHub API rate limit exceeded, reset in {reset_in:?}"
            );
            return Err(GitHubError::RateLimited { reset_in });
        }

        Ok(response)
    }
}

#[async_trait]
impl RunnerRegistry for GitHubRunnerClient {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn list_runners(&self, scope: &RunnerScope) -> Result<Vec<Runner>, GitHubError> {
        let url = self.runners_url(scope);
        let mut runners = Vec::new();

        for page in 1.. {
            let request = self.http_client.get(&url).query(&[
                ("per_page", RUNNERS_PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);
            let response = self.send(request).await?;

            let status = response.status();
            if !status.is_success() {
                return Err(api_error(status, response).await);
            }

            let RunnerPage {
                total_count,
                runners: page_runners,
            } = response.json().await?;

            let received = page_runners.len();
            runners.extend(page_runners);

            if received == 0 || runners.len() >= total_count {
                break;
            }
        }

        debug!("Listed {} runners", runners.len());
        Ok(runners)
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn remove_runner(&self, scope: &RunnerScope, runner_id: i64) -> Result<(), GitHubError> {
        let url = format!("{}/{runner_id}", self.runners_url(scope));
        let response = self.send(self.http_client.delete(&url)).await?;

        match response.status() {
            status if status.is_success() => {
                debug!("Removed runner {}", runner_id);
                Ok(())
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let message = error_message(response).await;
                Err(GitHubError::RunnerBusy { message })
            }
            status => Err(api_error(status, response).await),
        }
    }
}

/// Detect a rate limit rejection from status and headers
fn rate_limit_reset(response: &Response) -> Option<Duration> {
    let status = response.status();
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let headers = response.headers();
    let header_value = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

    if let Some(retry_after) = header_value("retry-after").and_then(|s| s.parse::<u64>().ok()) {
        return Some(Duration::from_secs(retry_after));
    }

    if header_value("x-ratelimit-remaining") == Some("0") {
        let reset_in = header_value("x-ratelimit-reset")
            .and_then(|s| s.parse::<i64>().ok())
            .map_or(FALLBACK_RATE_LIMIT_RESET, |reset_timestamp| {
                let now = chrono::Utc::now().timestamp();
                #[allow(clippy::cast_sign_loss)]
                let seconds_until_reset = (reset_timestamp - now).max(0) as u64;
                Duration::from_secs(seconds_until_reset)
            });
        return Some(reset_in);
    }

    // 403 without rate limit headers is a permission problem
    (status == StatusCode::TOO_MANY_REQUESTS).then_some(FALLBACK_RATE_LIMIT_RESET)
}

async fn error_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<GitHubErrorBody>(&body).map_or(body, |error| error.message)
}

async fn api_error(status: StatusCode, response: Response) -> GitHubError {
    GitHubError::Api {
        status: status.as_u16(),
        message: error_message(response).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runners_url_per_scope() {
        let client = GitHubRunnerClient::new(GitHubConfig {
            base_url: "https://ghe.example.com/api/v3/".to_string(),
            ..GitHubConfig::new("token".to_string())
        })
        .unwrap();

        assert_eq!(
            client.runners_url(&RunnerScope::Enterprise("acme-corp".to_string())),
            "https://ghe.example.com/api/v3/enterprises/acme-corp/actions/runners"
        );
        assert_eq!(
            client.runners_url(&RunnerScope::Repository {
                owner: "acme".to_string(),
                repo: "widgets".to_string(),
            }),
            "https://ghe.example.com/api/v3/repos/acme/widgets/actions/runners"
        );
    }

    #[test]
    fn test_runner_page_deserialization() {
        let page: RunnerPage = serde_json::from_str(
            r#"{
                "total_count": 1,
                "runners": [{
                    "id": 23,
                    "name": "example-runnerset-0",
                    "os": "linux",
                    "status": "online",
                    "busy": true,
                    "labels": [{"id": 5, "name": "self-hosted", "type": "read-only"}]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(page.total_count, 1);
        assert_eq!(page.runners[0].id, 23);
        assert_eq!(page.runners[0].name, "example-runnerset-0");
        assert!(page.runners[0].busy);
    }
}
