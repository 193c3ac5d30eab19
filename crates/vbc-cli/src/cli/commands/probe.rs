//! `vbc probe` – locate ffmpeg and report its version.

use anyhow::{Context, Result};
use vbc_core::config::VbcConfig;
use vbc_core::engine::FfmpegEngine;

pub async fn run_probe(cfg: &VbcConfig) -> Result<()> {
    let engine = FfmpegEngine::resolve(cfg)
        .await
        .context("ffmpeg is unavailable")?;
    println!("{}", engine.path().display());
    println!("{}", engine.version());
    Ok(())
}
