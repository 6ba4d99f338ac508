//! Workers that claim jobs from the queue and run them to completion.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::coordinator::ReleaseEvent;
use crate::queue::JobQueue;
use wheelwright_core::artifact::ArtifactStore;
use wheelwright_core::executor::{BuildContext, JobExecutor};
use wheelwright_core::job::{BuildJob, JobStatus};

/// A worker that claims and executes jobs until the queue is drained.
pub struct Worker {
    pub id: usize,
    pub queue: Arc<JobQueue>,
    pub executor: Arc<dyn JobExecutor>,
    pub ctx: Arc<BuildContext>,
    pub store: Arc<ArtifactStore>,
    pub timeout: Duration,
    pub cancel: watch::Receiver<bool>,
    pub events: mpsc::Sender<ReleaseEvent>,
}

impl Worker {
    /// Run the worker loop, returning every job it finished.
    ///
    /// Each job ends in a terminal status no matter what the executor
    /// does: the timeout bounds a hung build, and cancellation drops the
    /// execute future (killing its child processes) and drains whatever
    /// is left in the queue as `Cancelled`.
    pub async fn run(mut self) -> Vec<BuildJob> {
        info!(worker = self.id, "starting worker");
        let mut finished = Vec::new();

        loop {
            if *self.cancel.borrow() {
                while let Some(mut job) = self.queue.claim() {
                    job.status = JobStatus::Cancelled;
                    job.finished_at = Some(Utc::now());
                    finished.push(job);
                }
                break;
            }

            let Some(mut job) = self.queue.claim() else {
                break;
            };
            let label = job.label();
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            let _ = self
                .events
                .send(ReleaseEvent::JobStarted {
                    label: label.clone(),
                })
                .await;

            let execute = self.executor.execute(&job, &self.ctx, &self.store);
            job.status = tokio::select! {
                _ = cancelled(&mut self.cancel) => JobStatus::Cancelled,
                result = tokio::time::timeout(self.timeout, execute) => match result {
                    Ok(Ok(refs)) => {
                        job.artifacts = refs;
                        JobStatus::Succeeded
                    }
                    Ok(Err(e)) => {
                        warn!(job = %label, error = %e, "job failed");
                        JobStatus::Failed {
                            message: e.to_string(),
                        }
                    }
                    Err(_) => {
                        warn!(job = %label, "job timed out");
                        JobStatus::Failed {
                            message: format!("timed out after {}s", self.timeout.as_secs()),
                        }
                    }
                },
            };
            job.finished_at = Some(Utc::now());
            let log_path = self.ctx.log_path(&label);
            if log_path.exists() {
                job.log_path = Some(log_path);
            }

            let _ = self
                .events
                .send(ReleaseEvent::JobFinished {
                    label,
                    status: job.status.clone(),
                })
                .await;
            finished.push(job);
        }

        info!(worker = self.id, jobs = finished.len(), "worker done");
        finished
    }
}

/// Resolves only when cancellation is actually requested. A dropped
/// sender means cancellation can never arrive, not that it has.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
