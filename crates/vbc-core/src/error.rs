//! Error taxonomy for the conversion core.
//!
//! Only [`EngineUnavailable`] is fatal for a session. Everything else is
//! per job and ends up attached to a terminal state as a [`JobError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineExit;

/// The engine could not be found or failed its availability probe.
#[derive(Debug, Clone, Error)]
pub enum EngineUnavailable {
    #[error("ffmpeg not found (searched: {searched})")]
    NotFound { searched: String },
    #[error("ffmpeg at {path} is not runnable: {reason}")]
    NotRunnable { path: PathBuf, reason: String },
    #[error("ffmpeg at {path} did not answer the version probe within {timeout_secs}s")]
    ProbeTimedOut { path: PathBuf, timeout_secs: u64 },
    #[error("ffmpeg at {path} failed the version probe ({exit})")]
    ProbeFailed { path: PathBuf, exit: String },
}

/// A job request that cannot be converted as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input path is empty")]
    EmptyInput,
    #[error("input {0} does not exist")]
    InputMissing(PathBuf),
    #[error("input {0} is not a regular file")]
    InputNotFile(PathBuf),
    #[error("input {path} is not readable: {reason}")]
    InputUnreadable { path: PathBuf, reason: String },
    #[error("unsupported output format {0:?}")]
    UnsupportedFormat(String),
    #[error("unknown resolution {0:?}")]
    UnknownResolution(String),
    #[error("output {0} would overwrite the input")]
    OutputIsInput(PathBuf),
    #[error("output {0} is already the destination of another job in this batch")]
    DuplicateOutput(PathBuf),
    #[error("output {0} would overwrite the input of another job in this batch")]
    OutputIsSiblingInput(PathBuf),
}

/// The engine process could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine process started without an output pipe")]
    NoOutput,
    #[error("{0}")]
    Other(String),
}

/// Diagnostic attached to a terminal job state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("invalid job: {0}")]
    Validation(#[from] ValidationError),
    #[error("failed to launch engine: {0}")]
    Launch(String),
    #[error("engine failed ({exit}): {diagnostic}")]
    Runtime { exit: EngineExit, diagnostic: String },
    #[error("engine reported success but {0} was not produced")]
    OutputMissing(PathBuf),
    #[error("engine closed its output but did not exit; {0}")]
    Stalled(String),
    #[error("engine process {} survived forced termination", pid_label(.pid))]
    ProcessLeaked { pid: Option<u32> },
    #[error("job task ended abnormally: {0}")]
    Aborted(String),
}

fn pid_label(pid: &Option<u32>) -> String {
    pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
}

impl From<LaunchError> for JobError {
    fn from(e: LaunchError) -> Self {
        JobError::Launch(e.to_string())
    }
}
