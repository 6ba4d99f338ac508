//! Executor traits and build context types.
//!
//! Executors run build jobs in isolated scratch directories and deposit
//! what they produce into the artifact store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::artifact::{ArtifactRef, ArtifactStore};
use crate::job::BuildJob;
use crate::target::Arch;
use crate::Result;

/// Everything an executor needs to run the jobs of one release.
///
/// Shared across all jobs of a run; per-target values are filled into the
/// command templates at execution time.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Package being released.
    pub package: String,
    /// Source checkout the build commands run against.
    pub source_dir: PathBuf,
    /// Command template for wheel builds. `${os}`, `${arch}`, `${python}`,
    /// `${python_tag}`, `${package}` and `${output}` are interpolated.
    pub build_command: String,
    /// Command template run against each built wheel when the target has
    /// tests enabled. `${artifact}` names the wheel under test.
    pub test_command: Option<String>,
    /// Command template for the sdist job.
    pub sdist_command: String,
    /// Extra environment variables set for build commands.
    pub env: HashMap<String, String>,
    /// Host environment variables passed through unchanged.
    pub pass_env: Vec<String>,
    /// Directory captured build logs are written under.
    pub log_dir: PathBuf,
}

impl BuildContext {
    /// Where the log for the job with this label is captured. The path is
    /// deterministic so callers can point at it even when a job fails.
    pub fn log_path(&self, label: &str) -> PathBuf {
        self.log_dir.join(format!("{label}.log"))
    }
}

/// Trait for job executors.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Name of this executor, for logs.
    fn name(&self) -> &'static str;

    /// Run one job to completion.
    ///
    /// On success the produced files are deposited into `store` and their
    /// references returned. On any failure nothing may reach the store.
    /// Implementations must be cancel-safe: dropping the returned future
    /// must not leave child processes running.
    async fn execute(
        &self,
        job: &BuildJob,
        ctx: &BuildContext,
        store: &ArtifactStore,
    ) -> Result<Vec<ArtifactRef>>;
}

/// Trait for preparing the host to run binaries of a foreign architecture.
#[async_trait]
pub trait Emulation: Send + Sync {
    /// Make binaries for `arch` runnable on this host.
    ///
    /// Called before the first job that builds for a foreign architecture;
    /// implementations memoize so repeated calls for one architecture do
    /// the work once. A failure here fails only the jobs needing that
    /// architecture.
    async fn prepare(&self, arch: Arch) -> Result<()>;
}
