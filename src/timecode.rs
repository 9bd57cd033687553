//! Seconds ↔ frame ↔ timecode conversion.
//!
//! Timelines in the editor start at one hour, so every record frame carries a
//! fixed offset (86400 at 24 fps). Source frames (trim points inside a media
//! item) carry no offset.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FPS: f64 = 24.0;
pub const DEFAULT_FRAME_OFFSET: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimecodeError {
    #[error("frame rate must be finite and positive, got {0}")]
    InvalidFps(f64),
    #[error("frame offset must be non-negative, got {0}")]
    InvalidOffset(i64),
}

/// Frame-rate and origin snapshot used for one assembly run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameClock {
    pub fps: f64,
    pub offset: i64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            offset: DEFAULT_FRAME_OFFSET,
        }
    }
}

impl FrameClock {
    pub fn new(fps: f64, offset: i64) -> Result<Self, TimecodeError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(TimecodeError::InvalidFps(fps));
        }
        if offset < 0 {
            return Err(TimecodeError::InvalidOffset(offset));
        }
        Ok(Self { fps, offset })
    }

    /// Frame count for a span of seconds. Halves round away from zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn frames(&self, seconds: f64) -> i64 {
        (seconds * self.fps).round() as i64
    }

    /// Absolute timeline frame for a position in seconds:
    /// `offset + round(seconds × fps)`.
    pub fn record_frame(&self, seconds: f64) -> i64 {
        self.offset + self.frames(seconds)
    }

    /// Frame inside a media item for a trim point in seconds (no offset).
    pub fn source_frame(&self, seconds: f64) -> i64 {
        self.frames(seconds)
    }

    /// Inverse of [`record_frame`](Self::record_frame), exact on frame boundaries.
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds(&self, record_frame: i64) -> f64 {
        (record_frame - self.offset) as f64 / self.fps
    }

    pub fn timecode(&self, frame: i64) -> String {
        frame_to_timecode(frame, self.fps)
    }
}

/// Integer frames per second used for timecode display (23.976 → 24).
#[allow(clippy::cast_possible_truncation)]
fn nominal_fps(fps: f64) -> i64 {
    (fps.round() as i64).max(1)
}

/// Format an absolute frame as `HH:MM:SS:FF` using the nominal frame rate.
pub fn frame_to_timecode(frame: i64, fps: f64) -> String {
    let fps = nominal_fps(fps);
    let frame = frame.max(0);
    let h = frame / (3600 * fps);
    let rem = frame % (3600 * fps);
    let m = rem / (60 * fps);
    let rem = rem % (60 * fps);
    let s = rem / fps;
    let f = rem % fps;
    format!("{h:02}:{m:02}:{s:02}:{f:02}")
}

/// Parse `HH:MM:SS:FF` (`;` accepted as the frame separator) back to an
/// absolute frame. Returns `None` for malformed input or out-of-range fields.
pub fn timecode_to_frame(tc: &str, fps: f64) -> Option<i64> {
    let fps = nominal_fps(fps);
    let parts: Vec<i64> = tc
        .trim()
        .split([':', ';'])
        .map(|p| p.parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let [h, m, s, f] = parts.as_slice() else {
        return None;
    };
    if *h < 0 || !(0..60).contains(m) || !(0..60).contains(s) || !(0..fps).contains(f) {
        return None;
    }
    Some(((h * 60 + m) * 60 + s) * fps + f)
}
