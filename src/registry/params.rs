use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assembly::ExistingTimeline;

fn default_track_index() -> i64 {
    1
}

fn default_marker_color() -> String {
    "Blue".to_string()
}

fn default_marker_duration() -> i64 {
    1
}

// ── Session params ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HelpParams {
    /// Category name (e.g. "timeline") or command name (e.g. "build_timeline").
    #[serde(default)]
    pub topic: Option<String>,
}

// ── Shared params ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NameParams {
    pub name: String,
}

// ── Timeline params ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TimelineItemsParams {
    /// 1-based video track.
    #[serde(default = "default_track_index")]
    pub track_index: i64,
}

// ── Media params ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportMediaParams {
    /// Absolute file paths as seen by the editor's machine.
    pub paths: Vec<String>,
}

// ── Assembly params ─────────────────────────────────────────────

/// A cut list given either inline or as a path to a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CutListSource {
    /// Path to a cut-list JSON file.
    #[serde(default)]
    pub path: Option<String>,
    /// Inline cut-list document.
    #[serde(default)]
    pub cut_list: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BuildTimelineParams {
    #[serde(flatten)]
    pub source: CutListSource,
    /// Insert a composition for each placeholder row. Defaults to the setting.
    #[serde(default)]
    pub insert_placeholder_composition: Option<bool>,
    /// What to do if the timeline name is taken. Defaults to the setting.
    #[serde(default)]
    pub on_existing: Option<ExistingTimeline>,
    #[serde(default)]
    pub track_index: Option<i64>,
    /// Frame rate for this run. Defaults to the timeline setting.
    #[serde(default)]
    pub fps: Option<f64>,
    /// Record frame of the timeline's first frame. Defaults to the setting.
    #[serde(default)]
    pub frame_offset: Option<i64>,
}

// ── Playback params ─────────────────────────────────────────────

/// A timeline position, as seconds from the start or as a timecode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PositionParams {
    #[serde(default)]
    pub seconds: Option<f64>,
    /// `HH:MM:SS:FF` record timecode.
    #[serde(default)]
    pub timecode: Option<String>,
}

// ── Marker params ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddMarkerParams {
    /// Seconds from the start of the timeline.
    pub seconds: f64,
    #[serde(default = "default_marker_color")]
    pub color: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub note: String,
    /// Length in frames.
    #[serde(default = "default_marker_duration")]
    pub duration: i64,
}

// ── Render params ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StartRenderParams {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub target_dir: Option<String>,
    #[serde(default)]
    pub custom_name: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_params_accept_path_or_inline() {
        let p: BuildTimelineParams =
            serde_json::from_value(json!({ "path": "cut.json", "on_existing": "replace" })).unwrap();
        assert_eq!(p.source.path.as_deref(), Some("cut.json"));
        assert_eq!(p.on_existing, Some(ExistingTimeline::Replace));
        assert!(p.insert_placeholder_composition.is_none());

        let p: BuildTimelineParams =
            serde_json::from_value(json!({ "cut_list": { "name": "T", "clips": [] } })).unwrap();
        assert!(p.source.cut_list.is_some());
    }

    #[test]
    fn marker_defaults() {
        let p: AddMarkerParams = serde_json::from_value(json!({ "seconds": 2.0 })).unwrap();
        assert_eq!(p.color, "Blue");
        assert_eq!(p.duration, 1);
    }
}
