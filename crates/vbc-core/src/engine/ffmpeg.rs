//! ffmpeg as a child process.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, Command};

use super::{locate, EngineExit, EngineGateway, EngineProcess};
use crate::config::VbcConfig;
use crate::error::{EngineUnavailable, LaunchError};
use crate::job::JobSpec;

/// A located and probed ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    path: PathBuf,
    version: String,
}

impl FfmpegEngine {
    /// Locate ffmpeg per `cfg.engine_path` (or the default search) and probe it.
    pub async fn resolve(cfg: &VbcConfig) -> Result<Self, EngineUnavailable> {
        let path = locate::locate(cfg.engine_path.as_deref())?;
        Self::at_path(path, Duration::from_secs(cfg.probe_timeout_secs)).await
    }

    /// Probe a specific binary with `-version`, bounded by `probe_timeout`.
    pub async fn at_path(
        path: impl Into<PathBuf>,
        probe_timeout: Duration,
    ) -> Result<Self, EngineUnavailable> {
        let path = path.into();
        let version = probe(&path, probe_timeout).await?;
        tracing::info!(path = %path.display(), %version, "ffmpeg available");
        Ok(Self { path, version })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First line of `ffmpeg -version`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Command-line arguments for one conversion. Output always overwrites.
    pub fn build_args(spec: &JobSpec) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            spec.input().into(),
        ];
        if let Some(res) = spec.resolution() {
            args.push("-vf".into());
            args.push(
                format!(
                    "scale=w={}:h={}:force_original_aspect_ratio=decrease:force_divisible_by=2",
                    res.width, res.height
                )
                .into(),
            );
        }
        args.push("-f".into());
        args.push(spec.format().muxer().into());
        args.push(spec.output().into());
        args
    }
}

impl EngineGateway for FfmpegEngine {
    type Process = FfmpegProcess;

    fn start(&self, spec: &JobSpec) -> Result<FfmpegProcess, LaunchError> {
        let mut cmd = Command::new(&self.path);
        cmd.args(Self::build_args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: self.path.clone(),
            source,
        })?;
        if child.stderr.is_none() {
            let _ = child.start_kill();
            return Err(LaunchError::NoOutput);
        }
        tracing::debug!(
            pid = ?child.id(),
            input = %spec.input().display(),
            output = %spec.output().display(),
            "ffmpeg started"
        );
        Ok(FfmpegProcess { child })
    }
}

/// A running ffmpeg. Killed if dropped while still running.
#[derive(Debug)]
pub struct FfmpegProcess {
    child: Child,
}

impl EngineProcess for FfmpegProcess {
    type Output = ChildStderr;

    fn take_output(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<EngineExit>> {
        Ok(self.child.try_wait()?.map(EngineExit::from))
    }

    fn wait(&mut self) -> impl Future<Output = io::Result<EngineExit>> + Send + '_ {
        async move { self.child.wait().await.map(EngineExit::from) }
    }

    #[cfg(unix)]
    fn request_stop(&mut self) -> io::Result<()> {
        // No pid means the child was already reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        // SAFETY: plain syscall; the child is unreaped so the pid is still ours.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no cooperative stop on this platform",
        ))
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}

async fn probe(path: &Path, timeout: Duration) -> Result<String, EngineUnavailable> {
    let child = Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| EngineUnavailable::NotRunnable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    // On timeout the future is dropped and kill_on_drop reaps the probe.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(EngineUnavailable::NotRunnable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(EngineUnavailable::ProbeTimedOut {
                path: path.to_path_buf(),
                timeout_secs: timeout.as_secs(),
            })
        }
    };
    if !output.status.success() {
        return Err(EngineUnavailable::ProbeFailed {
            path: path.to_path_buf(),
            exit: EngineExit::from(output.status).to_string(),
        });
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown version")
        .to_string())
}
