//! Conversion jobs: identity, lifecycle state machine, and per-job execution.
//!
//! Lifecycle: `Pending -> Running -> {Succeeded | Failed | Cancelled}`, plus
//! `Pending -> Cancelled` and `Pending -> Failed` (rejected at submission or
//! engine failed to start). Terminal states are final. Every transition goes
//! through [`Job`]'s lock, so two racing transitions cannot both win.

mod log_tail;
pub(crate) mod run;
mod spec;

pub use spec::{destination_path, JobRequest, JobSpec};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::VbcConfig;
use crate::error::{JobError, ValidationError};
use crate::progress::{is_error_line, parse_duration_header, parse_line, LineEvent, ProgressSnapshot};
use crate::sink::ProgressSink;
use log_tail::LogTail;

/// Lines quoted in a failure diagnostic when no explicit error line was seen.
const DIAGNOSTIC_TAIL_LINES: usize = 3;

/// Process-unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        JobId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("#{}", self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Per-job execution settings shared by every job of a batch.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Directory destinations are derived in.
    pub output_dir: PathBuf,
    /// Time a cancelled process gets to exit after the stop request.
    pub grace_period: Duration,
    /// Bound on waiting for exit after a kill, or after the output stream closed.
    pub exit_timeout: Duration,
    /// Committed output lines retained per job.
    pub log_tail_lines: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            grace_period: Duration::from_secs(5),
            exit_timeout: Duration::from_secs(2),
            log_tail_lines: 40,
        }
    }
}

impl JobSettings {
    pub fn from_config(cfg: &VbcConfig) -> Self {
        let defaults = Self::default();
        Self {
            output_dir: cfg.output_dir.clone().unwrap_or(defaults.output_dir),
            grace_period: secs_or(cfg.grace_period_secs, defaults.grace_period),
            exit_timeout: secs_or(cfg.kill_wait_secs, defaults.exit_timeout),
            log_tail_lines: cfg.log_tail_lines,
        }
    }
}

fn secs_or(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(fallback)
}

/// Point-in-time view of a job, for display and serialization.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub state: JobState,
    pub progress: ProgressSnapshot,
    pub ratio: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug)]
struct JobInner {
    state: JobState,
    /// Engine start in progress; the job is still reported as Pending.
    launching: bool,
    error: Option<JobError>,
    snapshot: ProgressSnapshot,
    total_duration: Option<Duration>,
    last_error_line: Option<String>,
    log: LogTail,
}

/// One conversion and its observable state. Shared between the batch
/// handle, the job's task, and any controller via `Arc<Job>`.
pub struct Job {
    id: JobId,
    request: JobRequest,
    spec: Option<JobSpec>,
    cancel: CancellationToken,
    sink: Arc<dyn ProgressSink>,
    inner: Mutex<JobInner>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("input", &self.request.input)
            .field("state", &self.state())
            .finish()
    }
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        request: JobRequest,
        spec: JobSpec,
        sink: Arc<dyn ProgressSink>,
        log_tail_lines: usize,
    ) -> Self {
        Self::build(id, request, Some(spec), JobState::Pending, None, sink, log_tail_lines)
    }

    /// A job whose request failed validation. Starts out Failed.
    pub(crate) fn rejected(
        id: JobId,
        request: JobRequest,
        error: ValidationError,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self::build(
            id,
            request,
            None,
            JobState::Failed,
            Some(JobError::Validation(error)),
            sink,
            0,
        )
    }

    fn build(
        id: JobId,
        request: JobRequest,
        spec: Option<JobSpec>,
        state: JobState,
        error: Option<JobError>,
        sink: Arc<dyn ProgressSink>,
        log_tail_lines: usize,
    ) -> Self {
        Self {
            id,
            request,
            spec,
            cancel: CancellationToken::new(),
            sink,
            inner: Mutex::new(JobInner {
                state,
                launching: false,
                error,
                snapshot: ProgressSnapshot::default(),
                total_duration: None,
                last_error_line: None,
                log: LogTail::new(log_tail_lines),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn request(&self) -> &JobRequest {
        &self.request
    }

    /// The validated spec. None for a job rejected at submission.
    pub fn spec(&self) -> Option<&JobSpec> {
        self.spec.as_ref()
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    /// Diagnostic for Failed jobs (and Cancelled jobs whose process leaked).
    pub fn error(&self) -> Option<JobError> {
        self.lock().error.clone()
    }

    /// Latest parsed engine metrics.
    pub fn observe_progress(&self) -> ProgressSnapshot {
        self.lock().snapshot.clone()
    }

    /// Input duration reported by the engine, once known.
    pub fn total_duration(&self) -> Option<Duration> {
        self.lock().total_duration
    }

    /// Processed position over total duration, when both are known.
    pub fn completion_ratio(&self) -> Option<f64> {
        let inner = self.lock();
        inner.snapshot.ratio(inner.total_duration)
    }

    /// Retained committed output lines, oldest first.
    pub fn log_tail(&self) -> Vec<String> {
        self.lock().log.to_vec()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn status(&self) -> JobStatus {
        let inner = self.lock();
        JobStatus {
            id: self.id,
            input: self.request.input.clone(),
            output: self.spec.as_ref().map(|s| s.output().to_path_buf()),
            state: inner.state,
            progress: inner.snapshot.clone(),
            ratio: inner.snapshot.ratio(inner.total_duration),
            error: inner.error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Request cancellation.
    ///
    /// A Pending job that has not begun launching becomes Cancelled right
    /// here. A launching or Running job is stopped by its own task. Returns
    /// false if the job was already terminal or cancellation was already
    /// requested.
    pub fn request_cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        // Every cancel goes through this lock, so the check-then-set is exact.
        let first = !self.cancel.is_cancelled();
        self.cancel.cancel();
        let cancelled_now = inner.state == JobState::Pending && !inner.launching;
        if cancelled_now {
            inner.state = JobState::Cancelled;
        }
        drop(inner);

        if cancelled_now {
            tracing::info!(job = %self.id, "cancelled before start");
            self.sink.on_state_change(self.id, JobState::Cancelled, None);
        }
        first
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Claim the job for launching. False if it is no longer Pending or was
    /// cancelled.
    pub(crate) fn begin_launch(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != JobState::Pending || inner.launching || self.cancel.is_cancelled() {
            return false;
        }
        inner.launching = true;
        true
    }

    /// Launch succeeded. False if cancellation arrived during the launch; the
    /// caller must then stop the process it just started.
    pub(crate) fn mark_running(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.state != JobState::Pending || !inner.launching || self.cancel.is_cancelled() {
                return false;
            }
            inner.state = JobState::Running;
            inner.launching = false;
        }
        tracing::info!(job = %self.id, input = %self.request.input.display(), "conversion running");
        self.sink.on_state_change(self.id, JobState::Running, None);
        true
    }

    /// Feed one output line: updates the snapshot, total duration, and log
    /// tail, and notifies the sink. Ignored unless Running.
    pub(crate) fn observe_line(&self, event: &LineEvent) {
        let text = event.text();
        let committed = matches!(event, LineEvent::Commit(_));
        let progress = {
            let mut inner = self.lock();
            if inner.state != JobState::Running {
                return;
            }
            if committed {
                if inner.total_duration.is_none() {
                    inner.total_duration = parse_duration_header(text);
                }
                if is_error_line(text) {
                    inner.last_error_line = Some(text.trim().to_string());
                }
                inner.log.push(text.to_string());
            }
            let snapshot = parse_line(text);
            if snapshot.is_empty() {
                None
            } else {
                let ratio = snapshot.ratio(inner.total_duration);
                inner.snapshot = snapshot.clone();
                Some((snapshot, ratio))
            }
        };

        if committed {
            self.sink.on_log(self.id, text);
        }
        if let Some((snapshot, ratio)) = progress {
            self.sink.on_progress(self.id, &snapshot, ratio);
        }
    }

    /// Best diagnostic for a failed run: the last error-looking line, else
    /// the last few output lines.
    pub(crate) fn failure_diagnostic(&self) -> String {
        let inner = self.lock();
        if let Some(line) = &inner.last_error_line {
            return line.clone();
        }
        let tail = inner.log.last_lines(DIAGNOSTIC_TAIL_LINES);
        if tail.is_empty() {
            "engine produced no output".to_string()
        } else {
            tail.join(" | ")
        }
    }

    /// Enter a terminal state and notify the sink. A cancellation request
    /// overrides any other outcome; only a leak diagnostic survives it.
    /// No-op (returning the existing state) if already terminal.
    pub(crate) fn finish(&self, outcome: JobState, error: Option<JobError>) -> JobState {
        debug_assert!(outcome.is_terminal());
        let (state, error) = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return inner.state;
            }
            let (state, error) = if self.cancel.is_cancelled() && outcome != JobState::Cancelled {
                let leaked = error.filter(|e| matches!(e, JobError::ProcessLeaked { .. }));
                (JobState::Cancelled, leaked)
            } else {
                (outcome, error)
            };
            inner.state = state;
            inner.launching = false;
            inner.error = error.clone();
            (state, error)
        };

        match &error {
            Some(e) if state == JobState::Failed => {
                tracing::warn!(job = %self.id, input = %self.request.input.display(), "conversion failed: {}", e)
            }
            Some(e) => tracing::error!(job = %self.id, state = %state, "{}", e),
            None => tracing::info!(job = %self.id, state = %state, "conversion finished"),
        }
        self.sink.on_state_change(self.id, state, error.as_ref());
        state
    }
}
