use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::job::{Job, JobId, JobState, JobStatus};

/// Per-state job counts for a batch. Always derived from the jobs
/// themselves, never maintained separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchTally {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.terminal()
    }

    pub fn terminal(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    /// True when every job has reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.pending == 0 && self.running == 0
    }

    /// True when every job succeeded (vacuously for an empty batch).
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total()
    }

    fn count(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Running => self.running += 1,
            JobState::Succeeded => self.succeeded += 1,
            JobState::Failed => self.failed += 1,
            JobState::Cancelled => self.cancelled += 1,
        }
    }
}

/// The jobs of one batch. The set is fixed at submission.
#[derive(Debug)]
pub(crate) struct BatchState {
    order: Vec<JobId>,
    jobs: HashMap<JobId, Arc<Job>>,
}

impl BatchState {
    pub(crate) fn new(jobs: Vec<Arc<Job>>) -> Self {
        let order = jobs.iter().map(|j| j.id()).collect();
        let jobs = jobs.into_iter().map(|j| (j.id(), j)).collect();
        Self { order, jobs }
    }

    /// Jobs in submission order.
    pub(crate) fn jobs(&self) -> impl Iterator<Item = &Arc<Job>> + '_ {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    pub(crate) fn tally(&self) -> BatchTally {
        let mut tally = BatchTally::default();
        for job in self.jobs.values() {
            tally.count(job.state());
        }
        tally
    }
}

/// Caller's view of a submitted batch. Cheap to clone; every clone observes
/// and controls the same jobs.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    pub(super) state: Arc<BatchState>,
    pub(super) done: watch::Receiver<Option<BatchTally>>,
}

impl BatchHandle {
    /// Job ids in submission order.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.state.order.clone()
    }

    pub fn job(&self, id: JobId) -> Option<Arc<Job>> {
        self.state.jobs.get(&id).cloned()
    }

    /// Jobs in submission order.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.state.jobs().cloned().collect()
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.state.jobs().map(|j| j.status()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.order.is_empty()
    }

    pub fn tally(&self) -> BatchTally {
        self.state.tally()
    }

    /// Mean completion over all jobs: terminal jobs count as complete,
    /// pending ones as zero, running ones by their completion ratio (zero
    /// while unknown). An empty batch is complete.
    pub fn overall_progress(&self) -> f64 {
        let total = self.state.order.len();
        if total == 0 {
            return 1.0;
        }
        let sum: f64 = self
            .state
            .jobs
            .values()
            .map(|job| match job.state() {
                JobState::Pending => 0.0,
                JobState::Running => job.completion_ratio().unwrap_or(0.0),
                _ => 1.0,
            })
            .sum();
        (sum / total as f64).clamp(0.0, 1.0)
    }

    /// Cancel every non-terminal job. Returns how many cancellation requests
    /// took effect.
    pub fn cancel_all(&self) -> usize {
        let n = self.state.jobs().filter(|job| job.request_cancel()).count();
        tracing::info!(cancelled = n, "batch cancel requested");
        n
    }

    /// Cancel one job. False if the id is unknown, the job is already
    /// terminal, or it was already being cancelled.
    pub fn cancel_one(&self, id: JobId) -> bool {
        self.state
            .jobs
            .get(&id)
            .is_some_and(|job| job.request_cancel())
    }

    /// True once every job is terminal and completion has been announced.
    pub fn is_done(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait for every job to reach a terminal state.
    pub async fn wait(&self) -> BatchTally {
        let mut rx = self.done.clone();
        let result = rx.wait_for(Option::is_some).await.map(|t| *t);
        match result {
            Ok(Some(tally)) => tally,
            // Driver gone without announcing: report what the jobs say.
            _ => self.tally(),
        }
    }
}
