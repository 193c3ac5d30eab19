//! Engine gateway: the only boundary between the orchestrator and the
//! external transcoder.
//!
//! [`EngineGateway`] starts one process per job and [`EngineProcess`] is the
//! handle the job owns. [`terminate`] implements the stop/grace/kill
//! escalation on top of any process implementation.

mod ffmpeg;
mod locate;

pub use ffmpeg::{FfmpegEngine, FfmpegProcess};

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::error::{JobError, LaunchError};
use crate::job::JobSpec;

/// Starts conversions. Implementations translate a [`JobSpec`] into their
/// own invocation convention.
pub trait EngineGateway: Send + Sync + 'static {
    type Process: EngineProcess;

    /// Start converting `spec`. The output stream must be readable as soon
    /// as this returns. On error nothing may be left running.
    fn start(&self, spec: &JobSpec) -> Result<Self::Process, LaunchError>;
}

/// A running conversion, exclusively owned by one job.
pub trait EngineProcess: Send + 'static {
    type Output: AsyncRead + Unpin + Send + 'static;

    /// Take the progress/log stream. Returns None after the first call.
    fn take_output(&mut self) -> Option<Self::Output>;

    /// OS process id while the process has not been reaped.
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<EngineExit>>;

    /// Wait for exit and reap. Cancel-safe.
    fn wait(&mut self) -> impl Future<Output = io::Result<EngineExit>> + Send + '_;

    /// Ask the process to stop and finalize (SIGTERM). `Unsupported` when the
    /// platform has no cooperative stop.
    fn request_stop(&mut self) -> io::Result<()>;

    /// Force termination without waiting.
    fn kill(&mut self) -> io::Result<()>;
}

/// Exit status of an engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl EngineExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for EngineExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for EngineExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(sig)) => write!(f, "killed by signal {}", sig),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// How [`terminate`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process had already exited; nothing was sent.
    AlreadyExited,
    /// Exited within the grace period after the stop request.
    Graceful,
    /// Exited after being killed.
    Forced,
    /// Still not reaped after the kill wait. The handle is abandoned.
    Leaked { pid: Option<u32> },
}

impl Termination {
    /// Diagnostic to attach to the job's terminal state, if any.
    pub fn leak_error(self) -> Option<JobError> {
        match self {
            Termination::Leaked { pid } => Some(JobError::ProcessLeaked { pid }),
            _ => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::AlreadyExited => f.write_str("process had already exited"),
            Termination::Graceful => f.write_str("stopped after stop request"),
            Termination::Forced => f.write_str("killed after grace period"),
            Termination::Leaked { pid: Some(pid) } => {
                write!(f, "process {} survived kill", pid)
            }
            Termination::Leaked { pid: None } => f.write_str("process survived kill"),
        }
    }
}

/// Stop `process`: cooperative request, up to `grace` to comply, then kill
/// and up to `kill_wait` to reap. Idempotent: an exited process is left alone.
pub async fn terminate<P: EngineProcess>(
    process: &mut P,
    grace: Duration,
    kill_wait: Duration,
) -> Termination {
    let pid = process.id();
    match process.try_wait() {
        Ok(Some(_)) => return Termination::AlreadyExited,
        Ok(None) => {}
        Err(e) => tracing::debug!(?pid, "exit check before terminate: {}", e),
    }

    if !grace.is_zero() {
        match process.request_stop() {
            Ok(()) => {
                if let Ok(Ok(exit)) = tokio::time::timeout(grace, process.wait()).await {
                    tracing::debug!(?pid, %exit, "engine stopped on request");
                    return Termination::Graceful;
                }
                tracing::warn!(
                    ?pid,
                    grace_ms = grace.as_millis() as u64,
                    "engine ignored stop request; killing"
                );
            }
            Err(e) => tracing::debug!(?pid, "cooperative stop unavailable: {}", e),
        }
    }

    if let Err(e) = process.kill() {
        tracing::debug!(?pid, "kill: {}", e);
    }
    match tokio::time::timeout(kill_wait, process.wait()).await {
        Ok(Ok(_)) => Termination::Forced,
        Ok(Err(e)) => {
            tracing::error!(?pid, "reaping killed engine: {}", e);
            Termination::Leaked { pid }
        }
        Err(_) => {
            tracing::error!(
                ?pid,
                wait_ms = kill_wait.as_millis() as u64,
                "engine did not exit after kill"
            );
            Termination::Leaked { pid }
        }
    }
}
