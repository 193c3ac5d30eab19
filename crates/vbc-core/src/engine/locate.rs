//! Find the ffmpeg binary.

use std::path::{Path, PathBuf};

use crate::error::EngineUnavailable;

#[cfg(windows)]
const EXE: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const EXE: &str = "ffmpeg";

/// Resolve the binary to probe.
///
/// An explicitly configured path is authoritative: if it is missing the
/// search fails instead of silently falling back to another ffmpeg.
/// Otherwise: bundled `ffmpeg/bin/` under the working directory, then
/// `PATH`, then common install locations.
pub(crate) fn locate(configured: Option<&Path>) -> Result<PathBuf, EngineUnavailable> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(EngineUnavailable::NotFound {
            searched: path.display().to_string(),
        });
    }

    let mut searched = Vec::new();

    let bundled = Path::new("ffmpeg").join("bin").join(EXE);
    if bundled.is_file() {
        return Ok(bundled);
    }
    searched.push(bundled.display().to_string());

    if let Ok(path) = which::which("ffmpeg") {
        return Ok(path);
    }
    searched.push("PATH".to_string());

    for path in common_locations() {
        if path.is_file() {
            return Ok(path);
        }
        searched.push(path.display().to_string());
    }

    Err(EngineUnavailable::NotFound {
        searched: searched.join(", "),
    })
}

fn common_locations() -> Vec<PathBuf> {
    let paths: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/opt/homebrew/bin/ffmpeg",
            "/usr/local/bin/ffmpeg",
            "/opt/local/bin/ffmpeg",
        ]
    } else if cfg!(windows) {
        &[
            "C:\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
        ]
    } else {
        &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/snap/bin/ffmpeg"]
    };
    paths.iter().map(PathBuf::from).collect()
}
