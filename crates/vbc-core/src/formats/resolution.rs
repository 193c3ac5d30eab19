//! Target resolution: named presets or explicit `WIDTHxHEIGHT`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Largest dimension accepted for an explicit `WxH` request.
const MAX_DIMENSION: u32 = 16_384;

/// Named presets, in ascending size.
pub const RESOLUTION_PRESETS: &[(&str, Resolution)] = &[
    ("240p", Resolution::new(426, 240)),
    ("360p", Resolution::new(640, 360)),
    ("vga", Resolution::new(640, 480)),
    ("480p", Resolution::new(854, 480)),
    ("720p", Resolution::new(1280, 720)),
    ("1080p", Resolution::new(1920, 1080)),
    ("1440p", Resolution::new(2560, 1440)),
    ("2160p", Resolution::new(3840, 2160)),
    ("4k", Resolution::new(3840, 2160)),
];

/// Bounding box for the output picture. The source aspect ratio is kept,
/// so the result fits inside `width`×`height` rather than matching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Look up a preset by name (case-insensitive).
    pub fn preset(name: &str) -> Option<Resolution> {
        RESOLUTION_PRESETS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, r)| *r)
    }

    fn parse_dimensions(s: &str) -> Option<Resolution> {
        let (w, h) = s.split_once(['x', 'X', '×'])?;
        let width: u32 = w.trim().parse().ok()?;
        let height: u32 = h.trim().parse().ok()?;
        // Most encoders reject odd dimensions for 4:2:0 output.
        let valid = |d: u32| d > 0 && d <= MAX_DIMENSION && d % 2 == 0;
        (valid(width) && valid(height)).then_some(Resolution { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Resolution::preset(name)
            .or_else(|| Resolution::parse_dimensions(name))
            .ok_or_else(|| ValidationError::UnknownResolution(s.to_string()))
    }
}
