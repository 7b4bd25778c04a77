//! Registration scope of a runner.

use std::fmt;

use crate::error::{Error, Result};

/// The GitHub namespace a runner is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunnerScope {
    /// Enterprise-level runner, keyed by enterprise slug
    Enterprise(String),
    /// Organization-level runner
    Organization(String),
    /// Repository-level runner
    Repository { owner: String, repo: String },
}

impl RunnerScope {
    /// Build a scope from the enterprise / organization / repository triple.
    ///
    /// Exactly one of the three must be non-empty. A repository is given as
    /// `owner/repo`.
    pub fn from_parts(
        enterprise: Option<&str>,
        organization: Option<&str>,
        repository: Option<&str>,
    ) -> Result<Self> {
        fn populated(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }

        match (
            populated(enterprise),
            populated(organization),
            populated(repository),
        ) {
            (Some(enterprise), None, None) => Ok(Self::Enterprise(enterprise.to_string())),
            (None, Some(organization), None) => Ok(Self::Organization(organization.to_string())),
            (None, None, Some(repository)) => Self::repository(repository),
            (None, None, None) => Err(Error::InvalidScope(
                "one of enterprise, organization or repository is required".to_string(),
            )),
            _ => Err(Error::InvalidScope(
                "only one of enterprise, organization or repository may be set".to_string(),
            )),
        }
    }

    fn repository(full_name: &str) -> Result<Self> {
        match full_name.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::Repository {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(Error::InvalidScope(format!(
                "repository must be in owner/repo form, got '{full_name}'"
            ))),
        }
    }

    /// REST path prefix of the scope, without leading slash
    #[must_use]
    pub fn api_path(&self) -> String {
        match self {
            Self::Enterprise(enterprise) => format!("enterprises/{enterprise}"),
            Self::Organization(organization) => format!("orgs/{organization}"),
            Self::Repository { owner, repo } => format!("repos/{owner}/{repo}"),
        }
    }
}

impl fmt::Display for RunnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enterprise(enterprise) => write!(f, "enterprise/{enterprise}"),
            Self::Organization(organization) => write!(f, "organization/{organization}"),
            Self::Repository { owner, repo } => write!(f, "repository/{owner}/{repo}"),
        }
    }
}
