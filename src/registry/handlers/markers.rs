#![allow(clippy::needless_pass_by_value)]

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::registry::params::AddMarkerParams;
use crate::registry::validation::validate_non_negative;
use crate::registry::{CommandOutput, CommandResult};
use crate::remote::value;
use crate::session::SessionKind;
use crate::state::AppState;

/// Colors the editor accepts for markers.
const MARKER_COLORS: &[&str] = &[
    "Blue", "Cyan", "Green", "Yellow", "Red", "Pink", "Purple", "Fuchsia", "Rose", "Lavender",
    "Sky", "Mint", "Lemon", "Sand", "Cocoa", "Cream",
];

#[derive(Debug, Clone, Serialize)]
pub struct MarkerInfo {
    /// Frame relative to the start of the timeline.
    pub frame: i64,
    pub seconds: f64,
    pub color: String,
    pub name: String,
    pub note: String,
    pub duration: i64,
}

pub fn add_timeline_marker(
    state: &Arc<AppState>,
    p: AddMarkerParams,
) -> Result<CommandOutput, AppError> {
    validate_non_negative(p.seconds, "seconds")?;
    if p.duration < 1 {
        return Err(AppError::ValidationError {
            message: format!("duration ({}) must be at least one frame", p.duration),
        });
    }
    let Some(color) = MARKER_COLORS
        .iter()
        .find(|c| c.eq_ignore_ascii_case(p.color.trim()))
    else {
        return Err(AppError::ValidationError {
            message: format!(
                "Unknown marker color \"{}\". Valid: {}",
                p.color,
                MARKER_COLORS.join(", ")
            ),
        });
    };
    let clock = state.clock()?;
    let frame = clock.frames(p.seconds);
    let marker = MarkerInfo {
        frame,
        seconds: clock.seconds(clock.offset + frame),
        color: (*color).to_string(),
        name: p.name,
        note: p.note,
        duration: p.duration,
    };
    state.with_session(|s| {
        let added = s.invoke(
            SessionKind::Timeline,
            "AddMarker",
            vec![
                json!(marker.frame),
                json!(marker.color),
                json!(marker.name),
                json!(marker.note),
                json!(marker.duration),
            ],
        )?;
        if !value::truthy(&added) {
            return Err(AppError::ValidationError {
                message: format!("A marker already exists at frame {}", marker.frame),
            });
        }
        Ok::<_, AppError>(())
    })?;
    Ok(CommandOutput::new(
        format!("Added {} marker at {:.3}s.", marker.color, marker.seconds),
        CommandResult::AddTimelineMarker(marker),
    ))
}

fn field(entry: &Value, key: &str) -> String {
    entry.get(key).and_then(value::as_string).unwrap_or_default()
}

pub fn get_timeline_markers(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let fps = state.clock()?.fps;
    let reply = state.with_session(|s| s.invoke(SessionKind::Timeline, "GetMarkers", vec![]))?;
    let Value::Object(map) = reply else {
        return Ok(CommandOutput::new(
            "No markers.",
            CommandResult::GetTimelineMarkers(Vec::new()),
        ));
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let mut markers: Vec<MarkerInfo> = map
        .iter()
        .filter_map(|(key, entry)| {
            let frame = key.parse::<f64>().ok()?.round() as i64;
            Some(MarkerInfo {
                frame,
                seconds: frame as f64 / fps,
                color: field(entry, "color"),
                name: field(entry, "name"),
                note: field(entry, "note"),
                duration: entry.get("duration").and_then(value::as_i64).unwrap_or(1),
            })
        })
        .collect();
    markers.sort_by_key(|m| m.frame);
    Ok(CommandOutput::new(
        format!("{} marker(s).", markers.len()),
        CommandResult::GetTimelineMarkers(markers),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::registry::execute::execute_tool_call;
    use crate::remote::fake::FakeResolve;
    use crate::state::test_support::state_with;

    fn with_timeline() -> (Arc<AppState>, tempfile::TempDir) {
        let (state, dir) = state_with(&FakeResolve::new());
        execute_tool_call(&state, "test", "create_timeline", &json!({ "name": "T" })).unwrap();
        (state, dir)
    }

    #[test]
    fn markers_round_trip_sorted_by_frame() {
        let (state, _dir) = with_timeline();
        execute_tool_call(
            &state,
            "test",
            "add_timeline_marker",
            &json!({ "seconds": 3.0, "color": "red", "name": "fix audio" }),
        )
        .unwrap();
        execute_tool_call(&state, "test", "add_timeline_marker", &json!({ "seconds": 1.0 }))
            .unwrap();

        let out = execute_tool_call(&state, "test", "get_timeline_markers", &json!({})).unwrap();
        let CommandResult::GetTimelineMarkers(markers) = out.result else { panic!() };
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].frame, 24);
        assert_eq!(markers[0].color, "Blue");
        assert_eq!(markers[1].frame, 72);
        assert_eq!(markers[1].color, "Red");
        assert_eq!(markers[1].name, "fix audio");
    }

    #[test]
    fn duplicate_marker_frame_is_rejected() {
        let (state, _dir) = with_timeline();
        let input = json!({ "seconds": 2.0 });
        execute_tool_call(&state, "test", "add_timeline_marker", &input).unwrap();
        let err = execute_tool_call(&state, "test", "add_timeline_marker", &input).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn unknown_color_is_rejected_before_any_call() {
        let (state, _dir) = with_timeline();
        let err = execute_tool_call(
            &state,
            "test",
            "add_timeline_marker",
            &json!({ "seconds": 2.0, "color": "Mauve" }),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }
}
