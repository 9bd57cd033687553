//! Shared validation helpers for registry command handlers.
//!
//! Centralizes common checks so all handlers produce consistent error messages.

use crate::error::AppError;
use crate::timecode::{self, FrameClock};

use super::params::PositionParams;

/// Reject empty or whitespace-only names.
pub fn require_name(name: &str, what: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError {
            message: format!("{what} name must not be empty"),
        });
    }
    Ok(trimmed.to_string())
}

/// Validate that a value is finite and not negative.
pub fn validate_non_negative(value: f64, name: &str) -> Result<(), AppError> {
    if !value.is_finite() {
        return Err(AppError::ValidationError {
            message: format!("{name} must be finite"),
        });
    }
    if value < 0.0 {
        return Err(AppError::ValidationError {
            message: format!("{name} ({value:.3}) must not be negative"),
        });
    }
    Ok(())
}

pub fn validate_track_index(index: i64) -> Result<(), AppError> {
    if index < 1 {
        return Err(AppError::ValidationError {
            message: format!("track_index ({index}) must be >= 1"),
        });
    }
    Ok(())
}

/// Resolve a position to a record frame. `None` when neither form is given.
pub fn record_frame(clock: FrameClock, p: &PositionParams) -> Result<Option<i64>, AppError> {
    match (p.seconds, p.timecode.as_deref()) {
        (Some(_), Some(_)) => Err(AppError::ValidationError {
            message: "Give either seconds or timecode, not both".to_string(),
        }),
        (Some(seconds), None) => {
            validate_non_negative(seconds, "seconds")?;
            Ok(Some(clock.record_frame(seconds)))
        }
        (None, Some(tc)) => {
            let frame = timecode::timecode_to_frame(tc, clock.fps).ok_or_else(|| {
                AppError::ValidationError {
                    message: format!("Invalid timecode: {tc:?} (expected HH:MM:SS:FF)"),
                }
            })?;
            if frame < clock.offset {
                return Err(AppError::ValidationError {
                    message: format!("Timecode {tc} is before the start of the timeline"),
                });
            }
            Ok(Some(frame))
        }
        (None, None) => Ok(None),
    }
}
