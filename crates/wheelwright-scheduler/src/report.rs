//! The final report of a release run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use wheelwright_core::artifact::ArtifactRef;
use wheelwright_core::index::PublishReport;
use wheelwright_core::job::{BuildJob, JobStatus};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Everything built and the publish phase succeeded.
    Published,
    /// Build-only run; every required job succeeded.
    Built,
    /// A required job did not succeed, so publishing was withheld.
    BuildFailed,
    /// The publish phase ran and at least one upload failed.
    PublishFailed,
    /// Cancelled before completion. Nothing was published.
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Published | RunOutcome::Built)
    }

    /// Process exit code: 1 for build failures, 2 for publish failures,
    /// 130 (the SIGINT convention) for cancellation.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Published | RunOutcome::Built => 0,
            RunOutcome::BuildFailed => 1,
            RunOutcome::PublishFailed => 2,
            RunOutcome::Cancelled => 130,
        }
    }
}

/// One job's entry in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Job label, e.g. `linux-x86_64-cp39` or `sdist`.
    pub label: String,
    /// Whether this job gated publishing.
    pub required: bool,
    /// Terminal status.
    pub status: JobStatus,
    /// Artifacts the job deposited.
    pub artifacts: Vec<ArtifactRef>,
    /// Captured build log, if one was written.
    pub log: Option<PathBuf>,
    /// Wall-clock seconds spent, once finished.
    pub duration_secs: Option<f64>,
}

impl JobReport {
    pub fn from_job(job: &BuildJob) -> Self {
        Self {
            label: job.label(),
            required: job.kind.required(),
            status: job.status.clone(),
            artifacts: job.artifacts.clone(),
            log: job.log_path.clone(),
            duration_secs: job
                .duration()
                .map(|d| d.num_milliseconds() as f64 / 1000.0),
        }
    }
}

/// Everything that happened in one release run, machine-readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Package that was released.
    pub package: String,
    /// Version that was released.
    pub version: String,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Per-job results, in queue order.
    pub jobs: Vec<JobReport>,
    /// Per-file publish outcomes, when a publish phase ran.
    pub publish: Option<PublishReport>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.status.is_success()).count()
    }

    pub fn failed_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Failed { .. }))
            .count()
    }

    pub fn cancelled_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Cancelled))
            .count()
    }

    /// The required jobs that kept the release from publishing.
    pub fn blocking_jobs(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs
            .iter()
            .filter(|j| j.required && !j.status.is_success())
    }
}
