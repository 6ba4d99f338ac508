//! Release descriptions: what to build and where it gets published.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::target::BuildTarget;
use crate::{Error, Result};

/// A secret value. Debug-formats as a placeholder so tokens never reach
/// logs or reports, and deliberately does not implement `Serialize`.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying value, for building upload requests.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// A package index repository uploads go to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Name the repository is selected by on the command line.
    pub name: String,
    /// Upload endpoint, e.g. `https://upload.pypi.org/legacy/`.
    pub url: Url,
    /// Environment variable the upload username is read from.
    pub username_env: String,
    /// Environment variable the upload password or token is read from.
    pub password_env: String,
}

/// Credentials for a package index.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Upload user name. Token-based indexes use `__token__`.
    pub username: String,
    /// The token or password.
    pub password: Secret,
}

impl Credentials {
    /// Resolve credentials from the environment variables a repository
    /// names. Fails up front, before any build starts, so a missing token
    /// is caught in seconds rather than after an hour of compilation.
    /// Error messages name the variable, never its value.
    pub fn from_env(repository: &Repository) -> Result<Self> {
        Self::from_lookup(repository, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        repository: &Repository,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let read = |var: &str| {
            lookup(var).filter(|v| !v.is_empty()).ok_or_else(|| {
                Error::Credential(format!(
                    "environment variable {var} is not set (required to publish to {})",
                    repository.name
                ))
            })
        };
        Ok(Self {
            username: read(&repository.username_env)?,
            password: Secret::new(read(&repository.password_env)?),
        })
    }
}

/// One release run: the package and the jobs to build for it.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    /// Package name.
    pub package: String,
    /// Version string being released.
    pub version: String,
    /// Expanded build targets, already deduplicated and ordered.
    pub targets: Vec<BuildTarget>,
    /// Whether to build a source distribution alongside the wheels.
    pub sdist: bool,
}

impl ReleaseRequest {
    /// Total number of jobs this request fans out into.
    pub fn job_count(&self) -> usize {
        self.targets.len() + usize::from(self.sdist)
    }
}
