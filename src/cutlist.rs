//! Cut list parsing and validation.
//!
//! A cut list is a JSON document describing one timeline:
//!
//! ```json
//! { "name": "Edit v3",
//!   "clips": [
//!     { "shot_id": "S010", "file": "media/S010.mov",
//!       "timeline_start": 0.0, "timeline_end": 4.5,
//!       "clip_in": 1.0, "clip_out": 5.5, "notes": "" },
//!     { "shot_id": "S020", "file": null, ... } ] }
//! ```
//!
//! `file: null` marks a placeholder slot. The field must be present; a row that
//! omits it is rejected rather than silently treated as a placeholder.
//! Validation collects every problem before failing.

use std::fmt;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default tolerance between a row's advisory span and its source duration.
pub const DEFAULT_SPAN_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipPlacement {
    pub shot_id: String,
    /// Media file path, or `None` for a placeholder slot.
    pub file: Option<String>,
    pub timeline_start: f64,
    /// Advisory only; the placed length is always `clip_out - clip_in`.
    pub timeline_end: f64,
    pub clip_in: f64,
    pub clip_out: f64,
    #[serde(default)]
    pub notes: String,
}

impl ClipPlacement {
    /// Authoritative on-timeline length in seconds.
    pub fn duration(&self) -> f64 {
        self.clip_out - self.clip_in
    }

    pub fn advisory_span(&self) -> f64 {
        self.timeline_end - self.timeline_start
    }

    pub fn is_placeholder(&self) -> bool {
        self.file.is_none()
    }

    /// Final path component of `file`, with either separator style.
    pub fn basename(&self) -> Option<&str> {
        self.file
            .as_deref()
            .and_then(|f| f.rsplit(['/', '\\']).next())
            .filter(|b| !b.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RowWarning {
    pub row: usize,
    pub shot_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct CutList {
    pub name: String,
    pub clips: Vec<ClipPlacement>,
    /// Non-fatal findings, e.g. span/duration disagreement.
    pub warnings: Vec<RowWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Zero-based row, `None` for document-level problems.
    pub row: Option<usize>,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "clips[{row}].{}: {}", self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid cut list: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    fn document(field: &str, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                row: None,
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }
}

/// Tri-state `file`: absent (outer `None`), `null`, or a value.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Nullable<T> {
    Null,
    Value(T),
}

fn nullable_field<'de, T, D>(deserializer: D) -> Result<Option<Nullable<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Nullable::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct RawClip {
    shot_id: Option<String>,
    #[serde(default, deserialize_with = "nullable_field")]
    file: Option<Nullable<String>>,
    timeline_start: Option<f64>,
    timeline_end: Option<f64>,
    clip_in: Option<f64>,
    clip_out: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
}

/// Parse with the default span tolerance.
pub fn parse(raw: &str) -> Result<CutList, ValidationError> {
    parse_with(raw, DEFAULT_SPAN_EPSILON)
}

pub fn parse_with(raw: &str, span_epsilon: f64) -> Result<CutList, ValidationError> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ValidationError::document("document", format!("not valid JSON: {e}")))?;
    from_value(value, span_epsilon)
}

/// Read and parse a cut list file (UTF-8, optional BOM).
pub fn load(path: &Path, span_epsilon: f64) -> Result<CutList, ValidationError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ValidationError::document("document", format!("cannot read {}: {e}", path.display()))
    })?;
    parse_with(&raw, span_epsilon)
}

/// Validate an already-decoded document (e.g. inline tool parameters).
pub fn from_value(value: Value, span_epsilon: f64) -> Result<CutList, ValidationError> {
    let Value::Object(mut doc) = value else {
        return Err(ValidationError::document("document", "expected a JSON object"));
    };
    let mut issues = Vec::new();
    let mut push = |row: Option<usize>, field: &str, message: String| {
        issues.push(ValidationIssue {
            row,
            field: field.to_string(),
            message,
        });
    };

    let name = match doc.remove("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::String(_)) => {
            push(None, "name", "must not be empty".into());
            String::new()
        }
        Some(_) => {
            push(None, "name", "must be a string".into());
            String::new()
        }
        None => {
            push(None, "name", "is required".into());
            String::new()
        }
    };

    let rows = match doc.remove("clips") {
        Some(Value::Array(rows)) => rows,
        Some(_) => {
            push(None, "clips", "must be an array".into());
            Vec::new()
        }
        None => {
            push(None, "clips", "is required".into());
            Vec::new()
        }
    };

    let mut clips = Vec::with_capacity(rows.len());
    let mut warnings = Vec::new();
    for (row, raw) in rows.into_iter().enumerate() {
        let raw: RawClip = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                push(Some(row), "row", e.to_string());
                continue;
            }
        };
        let shot_id = match raw.shot_id {
            Some(s) if !s.trim().is_empty() => s,
            Some(_) => {
                push(Some(row), "shot_id", "must not be empty".into());
                String::new()
            }
            None => {
                push(Some(row), "shot_id", "is required".into());
                String::new()
            }
        };

        let file = match raw.file {
            None => {
                push(Some(row), "file", "is required (use null for a placeholder)".into());
                None
            }
            Some(Nullable::Null) => None,
            Some(Nullable::Value(f)) if f.trim().is_empty() => {
                push(Some(row), "file", "must be null or a non-empty path".into());
                None
            }
            Some(Nullable::Value(f)) => Some(f),
        };

        let mut number = |field: &str, v: Option<f64>| -> Option<f64> {
            match v {
                None => {
                    push(Some(row), field, "is required".into());
                    None
                }
                Some(x) if !x.is_finite() => {
                    push(Some(row), field, "must be finite".into());
                    None
                }
                Some(x) if x < 0.0 => {
                    push(Some(row), field, format!("must be >= 0, got {x}"));
                    None
                }
                Some(x) => Some(x),
            }
        };
        let timeline_start = number("timeline_start", raw.timeline_start);
        let timeline_end = number("timeline_end", raw.timeline_end);
        let clip_in = number("clip_in", raw.clip_in);
        let clip_out = number("clip_out", raw.clip_out);

        let (Some(timeline_start), Some(timeline_end), Some(clip_in), Some(clip_out)) =
            (timeline_start, timeline_end, clip_in, clip_out)
        else {
            continue;
        };
        if timeline_start >= timeline_end {
            push(
                Some(row),
                "timeline_end",
                format!("must be greater than timeline_start ({timeline_start} >= {timeline_end})"),
            );
            continue;
        }
        if clip_in >= clip_out {
            push(
                Some(row),
                "clip_out",
                format!("must be greater than clip_in ({clip_in} >= {clip_out})"),
            );
            continue;
        }

        let clip = ClipPlacement {
            shot_id,
            file,
            timeline_start,
            timeline_end,
            clip_in,
            clip_out,
            notes: raw.notes.unwrap_or_default(),
        };
        let drift = (clip.advisory_span() - clip.duration()).abs();
        if drift > span_epsilon {
            warnings.push(RowWarning {
                row,
                shot_id: clip.shot_id.clone(),
                message: format!(
                    "timeline span {:.3}s differs from source duration {:.3}s; using source duration",
                    clip.advisory_span(),
                    clip.duration()
                ),
            });
        }
        clips.push(clip);
    }

    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }
    Ok(CutList {
        name,
        clips,
        warnings,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(clips: Value) -> String {
        json!({ "name": "Reel 1", "clips": clips }).to_string()
    }

    fn row(shot: &str, file: Value, start: f64, end: f64, cin: f64, cout: f64) -> Value {
        json!({
            "shot_id": shot, "file": file,
            "timeline_start": start, "timeline_end": end,
            "clip_in": cin, "clip_out": cout,
        })
    }

    #[test]
    fn parses_scenario_with_placeholder() {
        let raw = doc(json!([
            row("A", Value::Null, 0.0, 7.0, 0.0, 7.0),
            row("B", json!("media/b.mp4"), 7.0, 13.381, 0.0, 6.381),
        ]));
        let cut = parse(&raw).unwrap();
        assert_eq!(cut.name, "Reel 1");
        assert_eq!(cut.clips.len(), 2);
        assert!(cut.clips[0].is_placeholder());
        assert_eq!(cut.clips[1].basename(), Some("b.mp4"));
        assert!((cut.clips[1].duration() - 6.381).abs() < 1e-9);
        assert!(cut.warnings.is_empty());
    }

    #[test]
    fn absent_file_is_an_error_but_null_is_a_placeholder() {
        let mut missing = row("A", Value::Null, 0.0, 1.0, 0.0, 1.0);
        missing.as_object_mut().unwrap().remove("file");
        let err = parse(&doc(json!([missing]))).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].field, "file");
        assert_eq!(err.issues[0].row, Some(0));
    }

    #[test]
    fn collects_every_issue() {
        let raw = json!({
            "name": "",
            "clips": [
                row("A", json!("a.mov"), 5.0, 2.0, 0.0, 1.0),
                row("", json!(""), 0.0, 1.0, 3.0, 1.0),
                { "shot_id": "C", "file": "c.mov", "timeline_start": "soon" },
            ]
        })
        .to_string();
        let err = parse(&raw).unwrap_err();
        let fields: Vec<(Option<usize>, &str)> =
            err.issues.iter().map(|i| (i.row, i.field.as_str())).collect();
        assert!(fields.contains(&(None, "name")));
        assert!(fields.contains(&(Some(0), "timeline_end")));
        assert!(fields.contains(&(Some(1), "shot_id")));
        assert!(fields.contains(&(Some(1), "file")));
        assert!(fields.contains(&(Some(1), "clip_out")));
        assert!(fields.contains(&(Some(2), "row")));
        assert!(err.to_string().contains("clips[0].timeline_end"));
    }

    #[test]
    fn negative_and_missing_numbers_are_rejected() {
        let raw = doc(json!([
            row("A", json!("a.mov"), -1.0, 1.0, 0.0, 1.0),
            { "shot_id": "B", "file": null, "timeline_start": 0.0, "timeline_end": 1.0, "clip_in": 0.0 },
        ]));
        let err = parse(&raw).unwrap_err();
        assert!(err.issues.iter().any(|i| i.row == Some(0) && i.field == "timeline_start"));
        assert!(err.issues.iter().any(|i| i.row == Some(1) && i.field == "clip_out"));
    }

    #[test]
    fn span_mismatch_is_a_warning_not_a_failure() {
        let raw = doc(json!([row("A", json!("a.mov"), 0.0, 5.0, 0.0, 4.0)]));
        let cut = parse(&raw).unwrap();
        assert_eq!(cut.clips.len(), 1);
        assert_eq!(cut.warnings.len(), 1);
        assert_eq!(cut.warnings[0].shot_id, "A");
        // A wider tolerance swallows it.
        assert!(parse_with(&raw, 1.5).unwrap().warnings.is_empty());
    }

    #[test]
    fn unicode_and_bom_are_accepted() {
        let raw = format!(
            "\u{feff}{}",
            json!({ "name": "Épisode 7 — 東京", "clips": [row("ショット1", json!("素材/クリップ.mov"), 0.0, 2.0, 0.0, 2.0)] })
        );
        let cut = parse(&raw).unwrap();
        assert_eq!(cut.name, "Épisode 7 — 東京");
        assert_eq!(cut.clips[0].basename(), Some("クリップ.mov"));
    }

    #[test]
    fn windows_separators_in_basename() {
        let raw = doc(json!([row("A", json!("D:\\proj\\media\\a.mov"), 0.0, 1.0, 0.0, 1.0)]));
        assert_eq!(parse(&raw).unwrap().clips[0].basename(), Some("a.mov"));
    }

    #[test]
    fn non_object_document() {
        let err = parse("[1, 2]").unwrap_err();
        assert_eq!(err.issues[0].field, "document");
        assert!(parse("{").is_err());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.json");
        std::fs::write(&path, doc(json!([row("A", Value::Null, 0.0, 1.0, 0.0, 1.0)]))).unwrap();
        assert_eq!(load(&path, DEFAULT_SPAN_EPSILON).unwrap().clips.len(), 1);
        assert!(load(&dir.path().join("nope.json"), DEFAULT_SPAN_EPSILON).is_err());
    }
}
