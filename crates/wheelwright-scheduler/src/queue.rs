//! In-memory job queue the build workers draw from.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use wheelwright_core::job::BuildJob;

/// A single-run work queue.
///
/// Every job of a release is known up front, so the queue is a locked
/// deque: workers claim from the front until it runs dry and then exit.
/// Claiming removes the job, which is what makes each job run exactly
/// once no matter how many workers race on it.
pub struct JobQueue {
    jobs: Mutex<VecDeque<BuildJob>>,
}

impl JobQueue {
    pub fn new(jobs: Vec<BuildJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BuildJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the next pending job. `None` means the queue is drained.
    pub fn claim(&self) -> Option<BuildJob> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use wheelwright_core::job::JobKind;

    fn jobs(n: usize) -> Vec<BuildJob> {
        (0..n).map(|_| BuildJob::new(JobKind::Sdist)).collect()
    }

    #[test]
    fn claims_in_fifo_order() {
        let input = jobs(3);
        let ids: Vec<_> = input.iter().map(|j| j.id).collect();
        let queue = JobQueue::new(input);

        let claimed: Vec<_> = std::iter::from_fn(|| queue.claim()).map(|j| j.id).collect();
        assert_eq!(claimed, ids);
        assert!(queue.claim().is_none());
    }

    #[test]
    fn concurrent_claims_never_hand_out_a_job_twice() {
        let queue = Arc::new(JobQueue::new(jobs(64)));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(std::thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(job) = queue.claim() {
                    seen.push(job.id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        assert_eq!(all.len(), 64);
        assert_eq!(all.iter().collect::<HashSet<_>>().len(), 64);
    }
}
