//! `vbc convert` – convert a batch of files and report progress.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use vbc_core::config::VbcConfig;
use vbc_core::engine::FfmpegEngine;
use vbc_core::job::{JobId, JobRequest, JobSettings};
use vbc_core::orchestrator::{BatchHandle, BatchTally, Orchestrator};
use vbc_core::sink::{ChannelSink, SinkEvent};

const PROGRESS_INTERVAL_MS: u64 = 500;

/// Resolution values that mean "keep the source size".
const KEEP_SIZE: &[&str] = &["source", "original", "none"];

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub inputs: Vec<PathBuf>,
    pub format: Option<String>,
    pub resolution: Option<String>,
    pub jobs: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
}

/// Build one request per input from CLI options, falling back to config.
pub(crate) fn build_requests(cfg: &VbcConfig, opts: &ConvertOptions) -> Vec<JobRequest> {
    let format = opts
        .format
        .clone()
        .unwrap_or_else(|| cfg.default_format.clone());
    let resolution = opts
        .resolution
        .clone()
        .or_else(|| cfg.default_resolution.clone())
        .filter(|r| !KEEP_SIZE.iter().any(|k| k.eq_ignore_ascii_case(r.trim())));
    opts.inputs
        .iter()
        .map(|input| JobRequest {
            input: input.clone(),
            format: format.clone(),
            resolution: resolution.clone(),
        })
        .collect()
}

/// Returns whether every conversion succeeded.
pub async fn run_convert(cfg: &VbcConfig, opts: ConvertOptions) -> Result<bool> {
    let engine = FfmpegEngine::resolve(cfg)
        .await
        .context("ffmpeg is unavailable")?;

    let mut settings = JobSettings::from_config(cfg);
    if let Some(dir) = &opts.output_dir {
        settings.output_dir = dir.clone();
    }
    std::fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("create output directory {}", settings.output_dir.display()))?;

    let requests = build_requests(cfg, &opts);
    let max_concurrent = opts.jobs.or(cfg.max_concurrent_jobs);

    let (sink, events) = ChannelSink::new();
    let orchestrator = Orchestrator::new(engine, Arc::new(sink), settings);
    let batch = orchestrator.submit_batch(requests, max_concurrent);
    let printer = tokio::spawn(print_events(events, batch.clone(), opts.json));

    let tally = tokio::select! {
        tally = batch.wait() => tally,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted; cancelling {} job(s)", batch.cancel_all());
            batch.wait().await
        }
    };
    let _ = printer.await;

    print_summary(&batch, &tally, opts.json);
    tracing::info!(
        succeeded = tally.succeeded,
        failed = tally.failed,
        cancelled = tally.cancelled,
        "convert finished"
    );
    Ok(tally.all_succeeded())
}

async fn print_events(mut events: UnboundedReceiver<SinkEvent>, batch: BatchHandle, json: bool) {
    let mut last_print: HashMap<JobId, Instant> = HashMap::new();
    while let Some(event) = events.recv().await {
        let done = matches!(event, SinkEvent::BatchComplete { .. });
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("serialize event: {}", e),
            }
        } else {
            print_text(&event, &batch, &mut last_print);
        }
        if done {
            break;
        }
    }
}

fn print_text(event: &SinkEvent, batch: &BatchHandle, last_print: &mut HashMap<JobId, Instant>) {
    match event {
        SinkEvent::Progress {
            job,
            snapshot,
            ratio,
        } => {
            let now = Instant::now();
            let due = last_print.get(job).map_or(true, |t| {
                now.duration_since(*t).as_millis() as u64 >= PROGRESS_INTERVAL_MS
            });
            if !due {
                return;
            }
            last_print.insert(*job, now);
            let pct = ratio
                .map(|r| format!("{:.1}%", r * 100.0))
                .unwrap_or_else(|| "?".to_string());
            let frame = snapshot
                .frame
                .map(|f| f.to_string())
                .unwrap_or_else(|| "?".to_string());
            let speed = snapshot
                .speed
                .map(|s| format!("{:.2}x", s))
                .unwrap_or_else(|| "?".to_string());
            println!(
                "  {} {}  frame {}  speed {}  (batch {:.1}%)",
                job,
                pct,
                frame,
                speed,
                batch.overall_progress() * 100.0
            );
        }
        SinkEvent::StateChange { job, state, error } => {
            let name = batch
                .job(*job)
                .map(|j| j.request().input.display().to_string())
                .unwrap_or_default();
            match error {
                Some(e) => println!("{} {} {}: {}", job, state, name, e),
                None => println!("{} {} {}", job, state, name),
            }
        }
        SinkEvent::Log { .. } | SinkEvent::BatchComplete { .. } => {}
    }
}

fn print_summary(batch: &BatchHandle, tally: &BatchTally, json: bool) {
    if json {
        let summary = serde_json::json!({
            "event": "summary",
            "tally": tally,
            "jobs": batch.statuses(),
        });
        println!("{}", summary);
        return;
    }
    for status in batch.statuses() {
        let output = status
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        match &status.error {
            Some(e) => println!(
                "{:>4}  {:<9}  {} -> {}  ({})",
                status.id, status.state, status.input.display(), output, e
            ),
            None => println!(
                "{:>4}  {:<9}  {} -> {}",
                status.id, status.state, status.input.display(), output
            ),
        }
    }
    println!(
        "{} succeeded, {} failed, {} cancelled",
        tally.succeeded, tally.failed, tally.cancelled
    );
}
