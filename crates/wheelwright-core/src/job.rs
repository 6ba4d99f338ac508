//! Build jobs and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::JobId;
use crate::artifact::ArtifactRef;
use crate::target::BuildTarget;

/// What a job produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// A binary wheel for one build target.
    Wheel(BuildTarget),
    /// The source distribution.
    Sdist,
}

impl JobKind {
    /// Human-readable label, e.g. `linux-x86_64-cp39` or `sdist`.
    pub fn label(&self) -> String {
        match self {
            JobKind::Wheel(target) => target.label(),
            JobKind::Sdist => "sdist".to_string(),
        }
    }

    /// Whether a failure of this job blocks the publish phase.
    pub fn required(&self) -> bool {
        match self {
            JobKind::Wheel(target) => target.required,
            JobKind::Sdist => true,
        }
    }

    /// The wheel target, if this is a wheel job.
    pub fn target(&self) -> Option<&BuildTarget> {
        match self {
            JobKind::Wheel(target) => Some(target),
            JobKind::Sdist => None,
        }
    }
}

/// Status of a build job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting in the queue.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed.
    Failed { message: String },
    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

/// One build job in a release run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    /// Unique identifier.
    pub id: JobId,
    /// What this job builds.
    pub kind: JobKind,
    /// Current status.
    pub status: JobStatus,
    /// Artifacts produced by this job, recorded when it succeeds.
    pub artifacts: Vec<ArtifactRef>,
    /// Where the captured build log was written, if anywhere.
    pub log_path: Option<PathBuf>,
    /// When the job started executing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildJob {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            artifacts: Vec::new(),
            log_path: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn label(&self) -> String {
        self.kind.label()
    }

    /// Whether this job's outcome prevents the release from publishing.
    /// Only required jobs gate the publish phase; optional jobs may fail
    /// without blocking it.
    pub fn blocks_publish(&self) -> bool {
        self.kind.required() && !self.status.is_success()
    }

    /// Wall-clock duration, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
