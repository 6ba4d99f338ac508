//! Release coordinator - fans a release out to build workers and gates
//! publishing on the results.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::queue::JobQueue;
use crate::report::{JobReport, RunOutcome, RunReport};
use crate::worker::Worker;
use wheelwright_core::artifact::ArtifactStore;
use wheelwright_core::executor::{BuildContext, JobExecutor};
use wheelwright_core::index::IndexClient;
use wheelwright_core::job::{BuildJob, JobKind, JobStatus};
use wheelwright_core::release::{Credentials, ReleaseRequest, Repository};
use wheelwright_publisher::Publisher;

/// Event emitted during a release run.
#[derive(Debug, Clone)]
pub enum ReleaseEvent {
    JobStarted { label: String },
    JobFinished { label: String, status: JobStatus },
    PublishStarted { repository: String, files: usize },
    PublishFinished { succeeded: bool },
    Completed { outcome: RunOutcome },
}

/// Where artifacts go once every required job has succeeded.
pub struct Destination {
    pub repository: Repository,
    pub credentials: Credentials,
    pub client: Arc<dyn IndexClient>,
}

/// Knobs for a single run.
pub struct RunOptions {
    /// Maximum number of jobs building at once.
    pub jobs: usize,
    /// Per-job wall-clock limit.
    pub timeout: Duration,
    /// Publish destination, or `None` for a build-only run.
    pub destination: Option<Destination>,
    /// Flipping this to `true` stops the run.
    pub cancel: watch::Receiver<bool>,
}

/// Drives one release: builds every job in the request, then publishes
/// the artifact store if nothing required failed.
pub struct ReleaseCoordinator {
    executor: Arc<dyn JobExecutor>,
}

impl ReleaseCoordinator {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self { executor }
    }

    /// Execute a release, returning a channel of events and a handle to get
    /// the final report.
    ///
    /// Builds never publish partially: either every required job succeeds
    /// and the whole store is uploaded, or the publish phase is withheld.
    pub fn execute(
        &self,
        request: ReleaseRequest,
        ctx: BuildContext,
        store: Arc<ArtifactStore>,
        options: RunOptions,
    ) -> (
        mpsc::Receiver<ReleaseEvent>,
        tokio::task::JoinHandle<RunReport>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let executor = self.executor.clone();

        let handle = tokio::spawn(async move {
            Self::execute_inner(executor, request, ctx, store, options, tx).await
        });

        (rx, handle)
    }

    /// Internal execution logic
    async fn execute_inner(
        executor: Arc<dyn JobExecutor>,
        request: ReleaseRequest,
        ctx: BuildContext,
        store: Arc<ArtifactStore>,
        options: RunOptions,
        tx: mpsc::Sender<ReleaseEvent>,
    ) -> RunReport {
        let started_at = Utc::now();

        // Wheels in matrix order, the sdist last. A broken build script
        // then fails on the first wheel instead of at the very end.
        let mut jobs: Vec<BuildJob> = request
            .targets
            .iter()
            .map(|target| BuildJob::new(JobKind::Wheel(target.clone())))
            .collect();
        if request.sdist {
            jobs.push(BuildJob::new(JobKind::Sdist));
        }
        let expected = jobs.len();
        let enqueue_order: HashMap<_, _> = jobs
            .iter()
            .enumerate()
            .map(|(idx, job)| (job.id, idx))
            .collect();

        let worker_count = options.jobs.min(expected).max(1);
        info!(
            package = %request.package,
            version = %request.version,
            jobs = expected,
            workers = worker_count,
            "starting release"
        );

        let queue = Arc::new(JobQueue::new(jobs));
        let ctx = Arc::new(ctx);
        let mut set = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                queue: queue.clone(),
                executor: executor.clone(),
                ctx: ctx.clone(),
                store: store.clone(),
                timeout: options.timeout,
                cancel: options.cancel.clone(),
                events: tx.clone(),
            };
            set.spawn(worker.run());
        }

        let mut finished: Vec<BuildJob> = Vec::with_capacity(expected);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(mut jobs) => finished.append(&mut jobs),
                Err(e) => error!(error = %e, "worker panicked"),
            }
        }
        finished.sort_by_key(|job| {
            enqueue_order.get(&job.id).copied().unwrap_or(usize::MAX)
        });

        let cancelled = *options.cancel.borrow();
        let blocked = finished.iter().any(|job| job.blocks_publish());
        // A panicked worker loses its claimed job; treat that like a
        // failed build rather than publishing an incomplete release.
        let accounted = finished.len() == expected;

        let (outcome, publish) = if blocked || !accounted {
            for job in finished.iter().filter(|job| job.blocks_publish()) {
                warn!(job = %job.label(), status = ?job.status, "required job did not succeed");
            }
            let outcome = if cancelled {
                RunOutcome::Cancelled
            } else {
                RunOutcome::BuildFailed
            };
            (outcome, None)
        } else if let Some(destination) = &options.destination {
            let _ = tx
                .send(ReleaseEvent::PublishStarted {
                    repository: destination.repository.name.clone(),
                    files: store.len(),
                })
                .await;

            let publisher = Publisher::new(destination.client.clone());
            let report = publisher
                .publish(
                    &destination.repository,
                    &destination.credentials,
                    &store,
                    options.cancel.clone(),
                )
                .await;
            let succeeded = report.succeeded();
            let _ = tx.send(ReleaseEvent::PublishFinished { succeeded }).await;

            let outcome = if succeeded {
                RunOutcome::Published
            } else if *options.cancel.borrow() {
                RunOutcome::Cancelled
            } else {
                RunOutcome::PublishFailed
            };
            (outcome, Some(report))
        } else {
            (RunOutcome::Built, None)
        };

        info!(package = %request.package, outcome = ?outcome, "release finished");
        let _ = tx.send(ReleaseEvent::Completed { outcome }).await;

        RunReport {
            package: request.package,
            version: request.version,
            outcome,
            jobs: finished.iter().map(JobReport::from_job).collect(),
            publish,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
