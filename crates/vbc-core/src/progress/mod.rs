//! Progress extraction from the engine's textual output.
//!
//! ffmpeg redraws its stats line with `\r` and commits log lines with `\n`.
//! [`LineBuffer`] turns raw output bytes into those two kinds of line events;
//! [`parse_line`] pulls the numeric fields out of a single line.

mod line_buffer;
mod parse;

pub use line_buffer::{LineBuffer, LineEvent, DEFAULT_MAX_LINE_BYTES};
pub use parse::{is_error_line, parse_duration_header, parse_line, parse_timestamp};

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Most recently parsed engine metrics for one job. Every field is
/// independently absent until the engine reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Frames written so far.
    pub frame: Option<u64>,
    /// Media time processed so far (serialized as seconds).
    #[serde(serialize_with = "serialize_secs")]
    pub position: Option<Duration>,
    /// Instantaneous frames per second.
    pub fps: Option<f64>,
    /// Instantaneous output bitrate in kbit/s.
    pub bitrate_kbps: Option<f64>,
    /// Encoding speed relative to real time (1.0 = real time).
    pub speed: Option<f64>,
}

impl ProgressSnapshot {
    /// True when no field was recognized.
    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
            && self.position.is_none()
            && self.fps.is_none()
            && self.bitrate_kbps.is_none()
            && self.speed.is_none()
    }

    /// Completion ratio against the input's total duration.
    pub fn ratio(&self, total: Option<Duration>) -> Option<f64> {
        completion_ratio(self.position?, total?)
    }
}

/// `position / total` clamped to `[0, 1]`. None when `total` is zero.
pub fn completion_ratio(position: Duration, total: Duration) -> Option<f64> {
    let total = total.as_secs_f64();
    if total <= 0.0 {
        return None;
    }
    Some((position.as_secs_f64() / total).clamp(0.0, 1.0))
}

fn serialize_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    d.map(|d| d.as_secs_f64()).serialize(s)
}
