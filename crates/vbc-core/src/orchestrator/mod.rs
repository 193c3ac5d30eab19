//! Batch submission and bounded-concurrency execution.
//!
//! [`Orchestrator::submit_batch`] validates every request up front (invalid
//! ones become Failed jobs at once), then hands the runnable jobs to a
//! background driver and returns a [`BatchHandle`] immediately.

mod batch;
mod driver;

pub use batch::{BatchHandle, BatchTally};
pub(crate) use batch::BatchState;

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::engine::EngineGateway;
use crate::error::ValidationError;
use crate::job::{Job, JobId, JobRequest, JobSettings, JobSpec, JobState};
use crate::sink::ProgressSink;
use driver::BatchDriver;

pub struct Orchestrator<E: EngineGateway> {
    engine: Arc<E>,
    sink: Arc<dyn ProgressSink>,
    settings: JobSettings,
}

impl<E: EngineGateway> Orchestrator<E> {
    pub fn new(engine: E, sink: Arc<dyn ProgressSink>, settings: JobSettings) -> Self {
        Self {
            engine: Arc::new(engine),
            sink,
            settings,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Submit a batch and start it. `max_concurrent` of None runs every job
    /// at once; `Some(0)` is treated as 1. Must be called within a Tokio
    /// runtime.
    pub fn submit_batch(
        &self,
        requests: Vec<JobRequest>,
        max_concurrent: Option<usize>,
    ) -> BatchHandle {
        let mut jobs = Vec::with_capacity(requests.len());
        let mut queue = VecDeque::new();
        let mut destinations: HashSet<PathBuf> = HashSet::new();
        // Every input of the batch, so no job's destination can be another's source.
        let inputs: HashSet<PathBuf> = requests
            .iter()
            .filter_map(|r| std::fs::canonicalize(&r.input).ok())
            .collect();

        for request in requests {
            let id = JobId::next();
            let validated = JobSpec::validate(&request, &self.settings.output_dir).and_then(|spec| {
                let output = spec.output().to_path_buf();
                if std::fs::canonicalize(&output).is_ok_and(|o| inputs.contains(&o)) {
                    Err(ValidationError::OutputIsSiblingInput(output))
                } else if destinations.insert(output.clone()) {
                    Ok(spec)
                } else {
                    Err(ValidationError::DuplicateOutput(output))
                }
            });
            let job = match validated {
                Ok(spec) => {
                    let job = Arc::new(Job::new(
                        id,
                        request,
                        spec,
                        Arc::clone(&self.sink),
                        self.settings.log_tail_lines,
                    ));
                    queue.push_back(Arc::clone(&job));
                    job
                }
                Err(e) => {
                    tracing::warn!(job = %id, input = %request.input.display(), "rejected: {}", e);
                    Arc::new(Job::rejected(id, request, e, Arc::clone(&self.sink)))
                }
            };
            jobs.push(job);
        }

        let state = Arc::new(BatchState::new(jobs));
        for job in state.jobs().filter(|j| j.state() == JobState::Failed) {
            self.sink
                .on_state_change(job.id(), JobState::Failed, job.error().as_ref());
        }

        let limit = max_concurrent.unwrap_or(queue.len()).max(1);
        tracing::info!(
            jobs = state.jobs().count(),
            runnable = queue.len(),
            max_concurrent = limit,
            "batch submitted"
        );

        let (done_tx, done_rx) = watch::channel(None);
        let driver = BatchDriver {
            state: Arc::clone(&state),
            queue,
            engine: Arc::clone(&self.engine),
            sink: Arc::clone(&self.sink),
            settings: self.settings.clone(),
            max_concurrent: limit,
            done: done_tx,
        };
        tokio::spawn(driver.run());

        BatchHandle {
            state,
            done: done_rx,
        }
    }
}
