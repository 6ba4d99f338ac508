//! Package index abstraction and publish outcomes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::StoredArtifact;
use crate::release::{Credentials, Repository};
use crate::Result;

/// What the index said about one uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The index accepted the file.
    Uploaded,
    /// The index already has a file with this name. Treated as success so
    /// re-running a release stays idempotent.
    AlreadyExists,
}

/// Trait for package index clients.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Name of this client, for logs.
    fn name(&self) -> &'static str;

    /// Upload one artifact to `repository`.
    ///
    /// Returns [`UploadOutcome::AlreadyExists`] when the index rejects the
    /// file as a duplicate. [`crate::Error::Credential`] means the index
    /// rejected the credentials themselves and further uploads are
    /// pointless; any other error is a per-file failure.
    async fn upload(
        &self,
        repository: &Repository,
        credentials: &Credentials,
        artifact: &StoredArtifact,
    ) -> Result<UploadOutcome>;
}

/// Per-file outcome recorded in the publish report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishOutcome {
    /// Freshly uploaded.
    Uploaded,
    /// The index already had it.
    AlreadyExists,
    /// Upload failed.
    Failed { message: String },
    /// Never attempted, because an earlier credential failure or a
    /// cancellation aborted the phase.
    Skipped,
}

/// One file's entry in the publish report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedFile {
    /// Artifact file name.
    pub name: String,
    /// Hex-encoded SHA-256 of the contents.
    pub digest: String,
    /// What happened to it.
    pub outcome: PublishOutcome,
}

/// Report of one publish phase, file by file in upload order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    /// Repository the files went to.
    pub repository: String,
    /// Per-file outcomes.
    pub files: Vec<PublishedFile>,
    /// Set when the whole phase was aborted, i.e. the index rejected the
    /// credentials. Distinct from per-file failures; the files after the
    /// rejection are recorded as skipped.
    pub fatal: Option<String>,
}

impl PublishReport {
    /// True when nothing was fatal and every file was either uploaded or
    /// already present.
    pub fn succeeded(&self) -> bool {
        self.fatal.is_none()
            && self.files.iter().all(|f| {
                matches!(
                    f.outcome,
                    PublishOutcome::Uploaded | PublishOutcome::AlreadyExists
                )
            })
    }

    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, PublishOutcome::Uploaded))
    }

    pub fn already_present(&self) -> usize {
        self.count(|o| matches!(o, PublishOutcome::AlreadyExists))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PublishOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PublishOutcome::Skipped))
    }

    fn count(&self, pred: impl Fn(&PublishOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, outcome: PublishOutcome) -> PublishedFile {
        PublishedFile {
            name: name.to_string(),
            digest: "0".repeat(64),
            outcome,
        }
    }

    #[test]
    fn already_present_counts_as_success() {
        let report = PublishReport {
            repository: "pypi".into(),
            files: vec![
                file("a.whl", PublishOutcome::Uploaded),
                file("b.whl", PublishOutcome::AlreadyExists),
            ],
            fatal: None,
        };
        assert!(report.succeeded());
        assert_eq!(report.uploaded(), 1);
        assert_eq!(report.already_present(), 1);
    }

    #[test]
    fn any_failure_fails_the_report() {
        let report = PublishReport {
            repository: "pypi".into(),
            files: vec![
                file("a.whl", PublishOutcome::Uploaded),
                file(
                    "b.whl",
                    PublishOutcome::Failed {
                        message: "503".into(),
                    },
                ),
                file("c.whl", PublishOutcome::Skipped),
            ],
            fatal: None,
        };
        assert!(!report.succeeded());
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn fatal_fails_the_report_regardless_of_files() {
        let report = PublishReport {
            repository: "pypi".into(),
            files: vec![],
            fatal: Some("invalid credentials".into()),
        };
        assert!(!report.succeeded());
    }
}
