//! CLI for the VBC batch video converter.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vbc_core::config;

use commands::{run_convert, run_formats, run_probe, ConvertOptions};

/// Top-level CLI for the VBC batch video converter.
#[derive(Debug, Parser)]
#[command(name = "vbc")]
#[command(about = "VBC: batch video conversion driven by ffmpeg", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Convert one or more video files.
    Convert {
        /// Input video files.
        #[arg(required = true, value_name = "INPUT")]
        inputs: Vec<PathBuf>,

        /// Output container: mp4, avi, mov, mkv or flv (default from config).
        #[arg(short, long)]
        format: Option<String>,

        /// Resolution preset (vga, 720p, ...) or WIDTHxHEIGHT; "source" keeps the input size.
        #[arg(short, long)]
        resolution: Option<String>,

        /// Run up to N conversions at once (default from config, else all at once).
        #[arg(short, long, value_name = "N")]
        jobs: Option<usize>,

        /// Directory for converted files (default from config, else the current directory).
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Emit events and the final summary as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// List supported output formats and resolution presets.
    Formats,

    /// Locate ffmpeg and print its version.
    Probe,
}

impl CliCommand {
    /// Parse arguments and run. `Ok(false)` means the command ran but some
    /// conversion did not succeed.
    pub async fn run_from_args() -> Result<bool> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Convert {
                inputs,
                format,
                resolution,
                jobs,
                output_dir,
                json,
            } => {
                let opts = ConvertOptions {
                    inputs,
                    format,
                    resolution,
                    jobs,
                    output_dir,
                    json,
                };
                run_convert(&cfg, opts).await
            }
            CliCommand::Formats => {
                run_formats();
                Ok(true)
            }
            CliCommand::Probe => {
                run_probe(&cfg).await?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests;
