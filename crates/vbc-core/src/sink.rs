//! Observer contract for job and batch events.
//!
//! Callbacks run on the thread or task that caused the event (usually a
//! job's task) and must not block. Per job, they arrive in order: `Running`,
//! then progress/log events, then exactly one terminal state change.
//! `on_batch_complete` fires once per batch, after every job's terminal event.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::JobError;
use crate::job::{JobId, JobState};
use crate::orchestrator::BatchTally;
use crate::progress::ProgressSnapshot;

pub trait ProgressSink: Send + Sync {
    /// New metrics for a running job. `ratio` is present once the input
    /// duration is known.
    fn on_progress(&self, _job: JobId, _snapshot: &ProgressSnapshot, _ratio: Option<f64>) {}

    /// One committed engine output line.
    fn on_log(&self, _job: JobId, _line: &str) {}

    /// Lifecycle transition. `error` accompanies Failed (and a Cancelled job
    /// whose process could not be reaped).
    fn on_state_change(&self, _job: JobId, _state: JobState, _error: Option<&JobError>) {}

    fn on_batch_complete(&self, _tally: &BatchTally) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {}

/// Owned form of a sink callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    Progress {
        job: JobId,
        #[serde(flatten)]
        snapshot: ProgressSnapshot,
        ratio: Option<f64>,
    },
    Log {
        job: JobId,
        line: String,
    },
    StateChange {
        job: JobId,
        state: JobState,
        error: Option<String>,
    },
    BatchComplete {
        #[serde(flatten)]
        tally: BatchTally,
    },
}

impl SinkEvent {
    pub fn job(&self) -> Option<JobId> {
        match self {
            SinkEvent::Progress { job, .. }
            | SinkEvent::Log { job, .. }
            | SinkEvent::StateChange { job, .. } => Some(*job),
            SinkEvent::BatchComplete { .. } => None,
        }
    }
}

/// Forwards every callback into an unbounded channel, so a consumer task
/// can render events without blocking job tasks. Events are dropped once
/// the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SinkEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, job: JobId, snapshot: &ProgressSnapshot, ratio: Option<f64>) {
        self.send(SinkEvent::Progress {
            job,
            snapshot: snapshot.clone(),
            ratio,
        });
    }

    fn on_log(&self, job: JobId, line: &str) {
        self.send(SinkEvent::Log {
            job,
            line: line.to_string(),
        });
    }

    fn on_state_change(&self, job: JobId, state: JobState, error: Option<&JobError>) {
        self.send(SinkEvent::StateChange {
            job,
            state,
            error: error.map(|e| e.to_string()),
        });
    }

    fn on_batch_complete(&self, tally: &BatchTally) {
        self.send(SinkEvent::BatchComplete { tally: *tally });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let id = crate::job::JobId::next();
        sink.on_state_change(id, JobState::Running, None);
        sink.on_log(id, "Stream mapping:");
        sink.on_batch_complete(&BatchTally::default());

        assert!(matches!(rx.try_recv(), Ok(SinkEvent::StateChange { state: JobState::Running, .. })));
        assert!(matches!(rx.try_recv(), Ok(SinkEvent::Log { ref line, .. }) if line == "Stream mapping:"));
        let last = rx.try_recv().unwrap();
        assert_eq!(last.job(), None);
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_log(crate::job::JobId::next(), "nobody listening");
    }
}
