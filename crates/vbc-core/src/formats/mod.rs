//! Supported output containers and resolution presets.

mod resolution;

pub use resolution::{Resolution, RESOLUTION_PRESETS};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Output container. The set is closed; anything else fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Avi,
    Mov,
    Mkv,
    Flv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Mp4,
        OutputFormat::Avi,
        OutputFormat::Mov,
        OutputFormat::Mkv,
        OutputFormat::Flv,
    ];

    /// File extension written on the destination (no leading dot).
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Avi => "avi",
            OutputFormat::Mov => "mov",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Flv => "flv",
        }
    }

    /// Muxer name passed to ffmpeg's `-f`.
    pub fn muxer(self) -> &'static str {
        match self {
            OutputFormat::Mkv => "matroska",
            other => other.extension(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    /// Case-insensitive; a leading dot (`.mkv`) is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_prefix('.').unwrap_or(name);
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(name))
            .ok_or_else(|| ValidationError::UnsupportedFormat(s.to_string()))
    }
}
