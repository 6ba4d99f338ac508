//! The publish driver: every stored artifact, in deposit order, to one
//! repository.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use wheelwright_core::artifact::ArtifactStore;
use wheelwright_core::index::{IndexClient, PublishOutcome, PublishReport, PublishedFile, UploadOutcome};
use wheelwright_core::release::{Credentials, Repository};

/// Drives uploads against an [`IndexClient`].
///
/// Per-file failures are recorded and the remaining files still get their
/// attempt, so one flaky upload does not hide the state of the rest. A
/// credential rejection aborts immediately: once the index refuses the
/// token, every further attempt would fail the same way.
pub struct Publisher {
    client: Arc<dyn IndexClient>,
}

impl Publisher {
    pub fn new(client: Arc<dyn IndexClient>) -> Self {
        Self { client }
    }

    pub async fn publish(
        &self,
        repository: &Repository,
        credentials: &Credentials,
        store: &ArtifactStore,
        cancel: watch::Receiver<bool>,
    ) -> PublishReport {
        let artifacts = store.list();
        info!(
            repository = %repository.name,
            files = artifacts.len(),
            client = self.client.name(),
            "publishing"
        );

        let mut files = Vec::with_capacity(artifacts.len());
        let mut fatal = None;
        for artifact in &artifacts {
            let name = artifact.reference.name.clone();
            let digest = artifact.reference.digest.clone();

            if fatal.is_some() || *cancel.borrow() {
                files.push(PublishedFile {
                    name,
                    digest,
                    outcome: PublishOutcome::Skipped,
                });
                continue;
            }

            let outcome = match self.client.upload(repository, credentials, artifact).await {
                Ok(UploadOutcome::Uploaded) => {
                    info!(file = %name, "uploaded");
                    PublishOutcome::Uploaded
                }
                Ok(UploadOutcome::AlreadyExists) => {
                    info!(file = %name, "already present, skipping");
                    PublishOutcome::AlreadyExists
                }
                Err(e) if e.is_publish_fatal() => {
                    error!(file = %name, error = %e, "aborting publish");
                    fatal = Some(e.to_string());
                    PublishOutcome::Failed {
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "upload failed");
                    PublishOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };
            files.push(PublishedFile {
                name,
                digest,
                outcome,
            });
        }

        PublishReport {
            repository: repository.name.clone(),
            files,
            fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io::Write as _;
    use std::sync::Mutex;
    use wheelwright_core::artifact::StoredArtifact;
    use wheelwright_core::{Error, JobId, Result};

    enum Script {
        Ok(UploadOutcome),
        Fail,
        RejectCredentials,
    }

    struct MockIndex {
        scripts: HashMap<String, Script>,
        calls: Mutex<Vec<String>>,
    }

    impl MockIndex {
        fn new(scripts: Vec<(&str, Script)>) -> Self {
            Self {
                scripts: scripts
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IndexClient for MockIndex {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn upload(
            &self,
            _repository: &Repository,
            _credentials: &Credentials,
            artifact: &StoredArtifact,
        ) -> Result<UploadOutcome> {
            let name = artifact.reference.name.clone();
            self.calls.lock().unwrap().push(name.clone());
            match self.scripts.get(&name) {
                Some(Script::Ok(outcome)) => Ok(*outcome),
                Some(Script::Fail) => Err(Error::Publish(format!("{name}: 503"))),
                Some(Script::RejectCredentials) => {
                    Err(Error::Credential("401".to_string()))
                }
                None => Ok(UploadOutcome::Uploaded),
            }
        }
    }

    fn repository() -> Repository {
        Repository {
            name: "testpypi".into(),
            url: "https://test.pypi.org/legacy/".parse().unwrap(),
            username_env: "U".into(),
            password_env: "P".into(),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "__token__".into(),
            password: wheelwright_core::release::Secret::new("tok"),
        }
    }

    fn store_with(names: &[&str]) -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("store")).unwrap();
        for name in names {
            let path = dir.path().join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            // Distinct contents per name so digests differ.
            f.write_all(name.as_bytes()).unwrap();
            store.deposit(JobId::new(), "job", &[path]).unwrap();
        }
        (dir, store)
    }

    fn not_cancelled() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn uploads_follow_deposit_order() {
        let (_dir, store) = store_with(&["b.whl", "a.whl", "c.tar.gz"]);
        let index = Arc::new(MockIndex::new(vec![]));
        let publisher = Publisher::new(index.clone());

        let report = publisher
            .publish(&repository(), &credentials(), &store, not_cancelled())
            .await;
        assert!(report.succeeded());
        assert_eq!(index.calls(), vec!["b.whl", "a.whl", "c.tar.gz"]);
    }

    #[tokio::test]
    async fn already_exists_counts_as_success() {
        let (_dir, store) = store_with(&["a.whl", "b.whl"]);
        let index = Arc::new(MockIndex::new(vec![(
            "a.whl",
            Script::Ok(UploadOutcome::AlreadyExists),
        )]));
        let report = Publisher::new(index)
            .publish(&repository(), &credentials(), &store, not_cancelled())
            .await;
        assert!(report.succeeded());
        assert_eq!(report.already_present(), 1);
        assert_eq!(report.uploaded(), 1);
    }

    #[tokio::test]
    async fn per_file_failure_does_not_stop_the_rest() {
        let (_dir, store) = store_with(&["a.whl", "b.whl", "c.whl"]);
        let index = Arc::new(MockIndex::new(vec![("b.whl", Script::Fail)]));
        let publisher = Publisher::new(index.clone());

        let report = publisher
            .publish(&repository(), &credentials(), &store, not_cancelled())
            .await;
        assert!(!report.succeeded());
        assert!(report.fatal.is_none(), "a 503 is not fatal");
        assert_eq!(report.failed(), 1);
        // c.whl was still attempted.
        assert_eq!(index.calls().len(), 3);
    }

    #[tokio::test]
    async fn credential_rejection_skips_the_rest() {
        let (_dir, store) = store_with(&["a.whl", "b.whl", "c.whl"]);
        let index = Arc::new(MockIndex::new(vec![(
            "a.whl",
            Script::RejectCredentials,
        )]));
        let publisher = Publisher::new(index.clone());

        let report = publisher
            .publish(&repository(), &credentials(), &store, not_cancelled())
            .await;
        assert!(!report.succeeded());
        assert!(report.fatal.is_some(), "credential rejection is fatal");
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 2);
        // Only the first file ever hit the index.
        assert_eq!(index.calls(), vec!["a.whl"]);
    }

    #[tokio::test]
    async fn cancellation_skips_everything() {
        let (_dir, store) = store_with(&["a.whl", "b.whl"]);
        let (tx, rx) = watch::channel(true);
        let _ = tx;
        let index = Arc::new(MockIndex::new(vec![]));
        let publisher = Publisher::new(index.clone());

        let report = publisher
            .publish(&repository(), &credentials(), &store, rx)
            .await;
        assert_eq!(report.skipped(), 2);
        assert!(index.calls().is_empty());
    }
}
