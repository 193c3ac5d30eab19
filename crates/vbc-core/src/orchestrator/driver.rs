//! Run a batch's jobs with bounded concurrency.
//!
//! Keeps up to `max_concurrent` jobs in flight; when one finishes, the next
//! queued job is started until the queue is empty. Jobs cancelled while
//! queued are skipped without ever occupying a slot.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

use super::{BatchState, BatchTally};
use crate::engine::EngineGateway;
use crate::error::JobError;
use crate::job::run::run_job;
use crate::job::{Job, JobSettings, JobState};
use crate::sink::ProgressSink;

pub(super) struct BatchDriver<E: EngineGateway> {
    pub(super) state: Arc<BatchState>,
    pub(super) queue: VecDeque<Arc<Job>>,
    pub(super) engine: Arc<E>,
    pub(super) sink: Arc<dyn ProgressSink>,
    pub(super) settings: JobSettings,
    pub(super) max_concurrent: usize,
    pub(super) done: watch::Sender<Option<BatchTally>>,
}

impl<E: EngineGateway> BatchDriver<E> {
    pub(super) async fn run(mut self) {
        let max_concurrent = self.max_concurrent.max(1);
        let mut join_set = tokio::task::JoinSet::new();

        loop {
            while join_set.len() < max_concurrent {
                let Some(job) = self.queue.pop_front() else {
                    break;
                };
                if job.state() != JobState::Pending {
                    continue;
                }
                let engine = Arc::clone(&self.engine);
                let settings = self.settings.clone();
                join_set.spawn(run_job(job, engine, settings));
            }

            if join_set.is_empty() {
                break;
            }

            let Some(res) = join_set.join_next().await else {
                break;
            };
            if let Err(e) = res {
                tracing::error!("job task join: {}", e);
            }
        }

        // A panicked job task leaves its job non-terminal.
        for job in self.state.jobs() {
            if !job.state().is_terminal() {
                job.finish(
                    JobState::Failed,
                    Some(JobError::Aborted("job task exited early".to_string())),
                );
            }
        }

        let tally = self.state.tally();
        tracing::info!(
            total = tally.total(),
            succeeded = tally.succeeded,
            failed = tally.failed,
            cancelled = tally.cancelled,
            "batch complete"
        );
        self.sink.on_batch_complete(&tally);
        let _ = self.done.send(Some(tally));
    }
}
