#![allow(dead_code)]

pub mod fake_engine;
#[cfg(unix)]
pub mod fake_ffmpeg;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use vbc_core::error::JobError;
use vbc_core::job::{JobId, JobSettings, JobState};
use vbc_core::orchestrator::BatchTally;
use vbc_core::progress::ProgressSnapshot;
use vbc_core::sink::{ProgressSink, SinkEvent};

/// Records every callback in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn for_job(&self, id: JobId) -> Vec<SinkEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job() == Some(id))
            .collect()
    }

    /// State changes of one job, in order.
    pub fn states(&self, id: JobId) -> Vec<JobState> {
        self.for_job(id)
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::StateChange { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn ratios(&self, id: JobId) -> Vec<f64> {
        self.for_job(id)
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Progress { ratio, .. } => ratio,
                _ => None,
            })
            .collect()
    }

    pub fn batch_completions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::BatchComplete { .. }))
            .count()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, job: JobId, snapshot: &ProgressSnapshot, ratio: Option<f64>) {
        self.push(SinkEvent::Progress {
            job,
            snapshot: snapshot.clone(),
            ratio,
        });
    }

    fn on_log(&self, job: JobId, line: &str) {
        self.push(SinkEvent::Log {
            job,
            line: line.to_string(),
        });
    }

    fn on_state_change(&self, job: JobId, state: JobState, error: Option<&JobError>) {
        self.push(SinkEvent::StateChange {
            job,
            state,
            error: error.map(|e| e.to_string()),
        });
    }

    fn on_batch_complete(&self, tally: &BatchTally) {
        self.push(SinkEvent::BatchComplete { tally: *tally });
    }
}

/// Create a placeholder input file.
pub fn input_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"placeholder video").unwrap();
    path
}

/// Short timeouts so escalation tests finish quickly.
pub fn fast_settings(output_dir: &Path) -> JobSettings {
    JobSettings {
        output_dir: output_dir.to_path_buf(),
        grace_period: Duration::from_millis(300),
        exit_timeout: Duration::from_millis(300),
        log_tail_lines: 16,
    }
}

/// Poll `cond` every 5 ms until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
