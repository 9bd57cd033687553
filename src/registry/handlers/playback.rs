#![allow(clippy::needless_pass_by_value)]

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::assembly;
use crate::error::AppError;
use crate::registry::params::PositionParams;
use crate::registry::validation::record_frame;
use crate::registry::{CommandOutput, CommandResult};
use crate::remote::value;
use crate::session::SessionKind;
use crate::state::AppState;
use crate::timecode::{self, FrameClock};

#[derive(Debug, Clone, Serialize)]
pub struct PlayheadInfo {
    pub timecode: String,
    pub record_frame: i64,
    /// Seconds from the start of the timeline.
    pub seconds: f64,
}

impl PlayheadInfo {
    fn at(clock: FrameClock, record_frame: i64) -> Self {
        Self {
            timecode: clock.timecode(record_frame),
            record_frame,
            seconds: clock.seconds(record_frame),
        }
    }
}

pub fn set_playhead(state: &Arc<AppState>, p: PositionParams) -> Result<CommandOutput, AppError> {
    let clock = state.clock()?;
    let frame = record_frame(clock, &p)?.ok_or_else(|| AppError::ValidationError {
        message: "Give a position as seconds or timecode".to_string(),
    })?;
    let info = PlayheadInfo::at(clock, frame);
    state.with_session(|s| {
        let moved = s.invoke(
            SessionKind::Timeline,
            "SetCurrentTimecode",
            vec![json!(info.timecode)],
        )?;
        if !value::truthy(&moved) {
            return Err(AppError::RemoteError {
                message: format!("the editor refused to move the playhead to {}", info.timecode),
            });
        }
        Ok::<_, AppError>(())
    })?;
    Ok(CommandOutput::new(
        format!("Playhead at {} ({:.3}s).", info.timecode, info.seconds),
        CommandResult::SetPlayhead(info),
    ))
}

/// Inserting ripples every later item on the track by the composition's length.
pub fn insert_fusion_composition(
    state: &Arc<AppState>,
    p: PositionParams,
) -> Result<CommandOutput, AppError> {
    let clock = state.clock()?;
    let requested = record_frame(clock, &p)?;
    let frame = state.with_session(|s| {
        let frame = match requested {
            Some(frame) => frame,
            None => {
                let tc = s.invoke(SessionKind::Timeline, "GetCurrentTimecode", vec![])?;
                let tc = value::as_string(&tc).unwrap_or_default();
                timecode::timecode_to_frame(&tc, clock.fps).ok_or_else(|| {
                    AppError::RemoteError {
                        message: format!("unreadable playhead timecode {tc:?}"),
                    }
                })?
            }
        };
        assembly::insert_composition(s, clock, frame)?;
        Ok::<_, AppError>(frame)
    })?;
    let info = PlayheadInfo::at(clock, frame);
    Ok(CommandOutput::new(
        format!("Inserted a composition at {}.", info.timecode),
        CommandResult::InsertFusionComposition(info),
    ))
}
