//! Field extraction from ffmpeg stats and header lines.
//!
//! ```text
//! frame=  120 fps= 30 q=28.0 size=     256kB time=00:00:04.00 bitrate= 512.3kbits/s speed=1.02x
//!   Duration: 00:01:40.00, start: 0.000000, bitrate: 1205 kb/s
//! ```
//!
//! The same keys arrive one per line with `-progress pipe:1`, which parses
//! identically.

use std::time::Duration;

use super::ProgressSnapshot;

/// Extract progress fields from one line. Unrecognized or malformed fields
/// are left absent; unrelated text yields an empty snapshot.
pub fn parse_line(line: &str) -> ProgressSnapshot {
    ProgressSnapshot {
        frame: field(line, "frame").and_then(|v| v.parse().ok()),
        position: field(line, "time").and_then(parse_timestamp),
        fps: field(line, "fps").and_then(parse_non_negative),
        bitrate_kbps: field(line, "bitrate")
            .and_then(|v| v.strip_suffix("kbits/s"))
            .and_then(parse_non_negative),
        speed: field(line, "speed")
            .and_then(|v| v.strip_suffix('x'))
            .and_then(parse_non_negative),
    }
}

/// Total input duration from the `Duration: HH:MM:SS.xx,` header ffmpeg
/// prints while opening the input. `Duration: N/A` yields None.
pub fn parse_duration_header(line: &str) -> Option<Duration> {
    let (_, rest) = line.split_once("Duration:")?;
    let value = rest
        .trim_start()
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()?;
    parse_timestamp(value)
}

/// Parse `[[HH:]MM:]SS[.frac]`. Negative, non-finite, or garbled values yield None.
pub fn parse_timestamp(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() || s.starts_with('-') {
        return None;
    }
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    let (last, leading) = parts.split_last()?;
    let mut secs = 0f64;
    for part in leading {
        let n: u64 = part.parse().ok()?;
        secs = secs * 60.0 + n as f64;
    }
    let tail = parse_non_negative(last)?;
    Duration::try_from_secs_f64(secs * 60.0 + tail).ok()
}

/// Heuristic for engine diagnostics worth surfacing when a job fails.
pub fn is_error_line(line: &str) -> bool {
    const MARKERS: &[&str] = &[
        "error",
        "invalid",
        "no such file",
        "not found",
        "unknown encoder",
        "unsupported",
        "could not",
        "failed",
        "permission denied",
    ];
    let lower = line.to_ascii_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

fn parse_non_negative(v: &str) -> Option<f64> {
    let n: f64 = v.trim().parse().ok()?;
    (n.is_finite() && n >= 0.0).then_some(n)
}

/// Value of `key=` when `key` starts a word. Tolerates padding after `=`
/// (`fps= 30`), stopping at the next whitespace.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(pos) = line[from..].find(key) {
        let start = from + pos;
        let end = start + key.len();
        let at_word_start = line[..start]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        if at_word_start {
            if let Some(rest) = line[end..].strip_prefix('=') {
                return rest.split_whitespace().next();
            }
        }
        from = end;
    }
    None
}
