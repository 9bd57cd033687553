#![allow(clippy::needless_pass_by_value)]

use std::path::Path;
use std::sync::Arc;

use crate::assembly::{self, AssemblyOptions};
use crate::cutlist::{self, CutList};
use crate::error::AppError;
use crate::registry::params::{BuildTimelineParams, CutListSource};
use crate::registry::validation::validate_track_index;
use crate::registry::{CommandOutput, CommandResult};
use crate::state::AppState;
use crate::timecode::FrameClock;

/// Load and validate a cut list given either as a file path or inline JSON.
pub fn load_cut_list(state: &Arc<AppState>, source: &CutListSource) -> Result<CutList, AppError> {
    let epsilon = state.span_epsilon();
    match (&source.path, &source.cut_list) {
        (Some(_), Some(_)) => Err(AppError::ValidationError {
            message: "Give either path or cut_list, not both".to_string(),
        }),
        (None, None) => Err(AppError::ValidationError {
            message: "A cut list is required: pass path or cut_list".to_string(),
        }),
        (Some(path), None) => Ok(cutlist::load(Path::new(path), epsilon)?),
        (None, Some(inline)) => Ok(cutlist::from_value(inline.clone(), epsilon)?),
    }
}

fn describe_warnings(cut: &CutList) -> String {
    match cut.warnings.len() {
        0 => String::new(),
        n => format!(" {n} warning(s)."),
    }
}

pub fn validate_cut_list(state: &Arc<AppState>, p: CutListSource) -> Result<CommandOutput, AppError> {
    let cut = load_cut_list(state, &p)?;
    let placeholders = cut.clips.iter().filter(|c| c.is_placeholder()).count();
    let message = format!(
        "Cut list \"{}\" is valid: {} row(s), {placeholders} placeholder(s).{}",
        cut.name,
        cut.clips.len(),
        describe_warnings(&cut)
    );
    Ok(CommandOutput::new(message, CommandResult::ValidateCutList(cut)))
}

pub fn build_timeline(state: &Arc<AppState>, p: BuildTimelineParams) -> Result<CommandOutput, AppError> {
    let cut = load_cut_list(state, &p.source)?;
    let defaults = state.with_settings(|s| s.assembly.options());
    let options = AssemblyOptions {
        insert_placeholder_composition: p
            .insert_placeholder_composition
            .unwrap_or(defaults.insert_placeholder_composition),
        on_existing: p.on_existing.unwrap_or(defaults.on_existing),
        track_index: p.track_index,
    };
    if let Some(track) = options.track_index {
        validate_track_index(track)?;
    }
    let clock = state
        .with_settings(|s| {
            FrameClock::new(
                p.fps.unwrap_or(s.timeline.fps),
                p.frame_offset.unwrap_or(s.timeline.frame_offset),
            )
        })
        .map_err(|e| AppError::ValidationError {
            message: e.to_string(),
        })?;

    let report = state.with_session(|s| assembly::assemble(s, &cut, &options, clock))?;
    let mut message = report.summary();
    for row in report.rows.iter().filter(|r| !r.warnings.is_empty()) {
        for warning in &row.warnings {
            message.push_str(&format!("\n  {}: {warning}", row.shot_id));
        }
    }
    Ok(CommandOutput::new(
        message,
        CommandResult::BuildTimeline(Box::new(report)),
    ))
}
