//! Per-job task: launch, supervise output, settle the outcome.

use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::{Job, JobSettings, JobState};
use crate::engine::{terminate, EngineExit, EngineGateway, EngineProcess};
use crate::error::JobError;
use crate::progress::{LineBuffer, LineEvent};

const READ_CHUNK: usize = 8 * 1024;

/// Run one job to a terminal state. Returns immediately if the job is not
/// Pending (cancelled while queued, or rejected at submission).
pub(crate) async fn run_job<E: EngineGateway>(
    job: Arc<Job>,
    engine: Arc<E>,
    settings: JobSettings,
) -> JobState {
    let Some(spec) = job.spec() else {
        return job.state();
    };
    if !job.begin_launch() {
        tracing::debug!(job = %job.id(), state = %job.state(), "skipping launch");
        return job.state();
    }

    let mut process = match engine.start(spec) {
        Ok(process) => process,
        Err(e) => return job.finish(JobState::Failed, Some(e.into())),
    };

    if !job.mark_running() {
        tracing::info!(job = %job.id(), "cancelled while launching");
        return stop_cancelled(&job, &mut process, &settings, false).await;
    }

    supervise(&job, &mut process, &settings).await
}

async fn supervise<P: EngineProcess>(job: &Job, process: &mut P, settings: &JobSettings) -> JobState {
    let cancel = job.cancel_token();

    if let Some(mut output) = process.take_output() {
        let mut lines = LineBuffer::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = output.read(&mut buf) => match read {
                    Ok(0) => {
                        // The last stats redraw is worth keeping in the log.
                        if let Some(event) = lines.finish() {
                            job.observe_line(&LineEvent::Commit(event.text().to_string()));
                        }
                        break;
                    }
                    Ok(n) => {
                        for event in lines.push(&buf[..n]) {
                            job.observe_line(&event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(job = %job.id(), "reading engine output: {}", e);
                        break;
                    }
                },
            }
        }
    }

    if cancel.is_cancelled() {
        return stop_cancelled(job, process, settings, true).await;
    }

    // Output closed. A healthy engine exits right after; bound the wait.
    let waited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = tokio::time::timeout(settings.exit_timeout, process.wait()) => Some(res),
    };
    match waited {
        None => stop_cancelled(job, process, settings, true).await,
        Some(Ok(Ok(exit))) => settle(job, exit).await,
        Some(Ok(Err(e))) => {
            let outcome = terminate(process, settings.grace_period, settings.exit_timeout).await;
            let error = outcome.leak_error().unwrap_or_else(|| JobError::Runtime {
                exit: EngineExit { code: None, signal: None },
                diagnostic: format!("waiting for engine: {}", e),
            });
            job.finish(JobState::Failed, Some(error))
        }
        Some(Err(_)) => {
            tracing::warn!(job = %job.id(), "engine closed its output but kept running");
            let outcome = terminate(process, settings.grace_period, settings.exit_timeout).await;
            let error = outcome
                .leak_error()
                .unwrap_or_else(|| JobError::Stalled(outcome.to_string()));
            job.finish(JobState::Failed, Some(error))
        }
    }
}

async fn settle(job: &Job, exit: EngineExit) -> JobState {
    if !exit.success() {
        let diagnostic = job.failure_diagnostic();
        return job.finish(JobState::Failed, Some(JobError::Runtime { exit, diagnostic }));
    }
    let Some(output) = job.spec().map(|s| s.output().to_path_buf()) else {
        return job.finish(JobState::Succeeded, None);
    };
    match tokio::fs::metadata(&output).await {
        Ok(meta) if meta.is_file() => job.finish(JobState::Succeeded, None),
        _ => job.finish(JobState::Failed, Some(JobError::OutputMissing(output))),
    }
}

/// Stop the process of a cancelled job and record the outcome. When the job
/// was Running, its partial destination file is removed once the process is
/// known to be gone. A job cancelled during launch never wrote the file, so
/// whatever is there is left alone.
async fn stop_cancelled<P: EngineProcess>(
    job: &Job,
    process: &mut P,
    settings: &JobSettings,
    remove_partial: bool,
) -> JobState {
    let outcome = terminate(process, settings.grace_period, settings.exit_timeout).await;
    tracing::debug!(job = %job.id(), %outcome, "engine stopped");
    let leak = outcome.leak_error();
    if remove_partial && leak.is_none() {
        if let Some(spec) = job.spec() {
            match tokio::fs::remove_file(spec.output()).await {
                Ok(()) => tracing::debug!(job = %job.id(), "removed partial output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(job = %job.id(), "removing partial output: {}", e),
            }
        }
    }
    job.finish(JobState::Cancelled, leak)
}
