//! `vbc formats` – list output containers and resolution presets.

use vbc_core::formats::{OutputFormat, RESOLUTION_PRESETS};

pub fn run_formats() {
    println!("Formats:");
    for format in OutputFormat::ALL {
        println!("  {:<5} (ffmpeg muxer: {})", format, format.muxer());
    }
    println!("Resolutions (fit within, aspect ratio kept):");
    for (name, res) in RESOLUTION_PRESETS {
        println!("  {:<6} {}", name, res);
    }
    println!("  WxH    explicit bounding box, even values");
}
