//! The reloadable part of the session logic: how each session kind is probed
//! and re-derived, and the placement policy used by timeline assembly.
//!
//! A profile is plain data (`logic.json`) so it can be edited and swapped in
//! while the process and its connection stay up.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionKind;

/// Highest retry count a profile may ask for on transient remote failures.
pub const MAX_TRANSIENT_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum LogicError {
    #[error("failed to read logic profile {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("logic profile is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid logic profile: {0}")]
    Invalid(String),
}

/// One accessor call in a derivation chain, applied to the parent's object
/// (or to the scripting entry point for the application root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStep {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CallStep {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            args: Vec::new(),
        }
    }
}

/// Probe and re-acquisition recipe for one session kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindRecipe {
    /// Read-only call that fails distinctively when the handle is dead.
    pub probe: CallStep,
    /// Accessor chain from the parent kind's object to this kind's object.
    pub derive: Vec<CallStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    /// Video track clips are placed on (1-based).
    pub track_index: i64,
    /// Extra attempts for a call that failed while its handle still probes alive.
    pub transient_retries: u32,
    /// Read back each placed item's duration and warn on mismatch.
    pub verify_duration: bool,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            track_index: 1,
            transient_retries: 1,
            verify_duration: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicProfile {
    /// Free-form label reported after a reload.
    pub revision: String,
    pub kinds: IndexMap<SessionKind, KindRecipe>,
    #[serde(default)]
    pub placement: PlacementPolicy,
    /// Seconds of disagreement tolerated between a row's advisory timeline span
    /// and its source duration before a warning is attached.
    #[serde(default = "default_span_epsilon")]
    pub span_epsilon: f64,
}

fn default_span_epsilon() -> f64 {
    0.05
}

impl Default for LogicProfile {
    fn default() -> Self {
        let recipe = |probe: &str, derive: &[CallStep]| KindRecipe {
            probe: CallStep::new(probe),
            derive: derive.to_vec(),
        };
        let mut kinds = IndexMap::new();
        kinds.insert(
            SessionKind::Application,
            recipe(
                "GetProductName",
                &[CallStep {
                    method: "scriptapp".to_string(),
                    args: vec![Value::from("Resolve")],
                }],
            ),
        );
        kinds.insert(
            SessionKind::ProjectManager,
            recipe("GetCurrentProject", &[CallStep::new("GetProjectManager")]),
        );
        kinds.insert(
            SessionKind::Project,
            recipe("GetName", &[CallStep::new("GetCurrentProject")]),
        );
        kinds.insert(
            SessionKind::MediaLibrary,
            recipe("GetRootFolder", &[CallStep::new("GetMediaPool")]),
        );
        kinds.insert(
            SessionKind::Timeline,
            recipe("GetName", &[CallStep::new("GetCurrentTimeline")]),
        );
        Self {
            revision: "builtin".to_string(),
            kinds,
            placement: PlacementPolicy::default(),
            span_epsilon: default_span_epsilon(),
        }
    }
}

impl LogicProfile {
    pub fn from_json(raw: &str) -> Result<Self, LogicError> {
        let profile: Self = serde_json::from_str(raw.trim_start_matches('\u{feff}'))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self, LogicError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LogicError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), LogicError> {
        for kind in SessionKind::all() {
            let recipe = self
                .kinds
                .get(kind)
                .ok_or_else(|| LogicError::Invalid(format!("no recipe for {kind}")))?;
            if recipe.probe.method.is_empty() {
                return Err(LogicError::Invalid(format!("{kind}: empty probe method")));
            }
            if recipe.derive.is_empty() || recipe.derive.iter().any(|s| s.method.is_empty()) {
                return Err(LogicError::Invalid(format!(
                    "{kind}: derivation needs at least one named call"
                )));
            }
        }
        if self.placement.track_index < 1 {
            return Err(LogicError::Invalid("placement.track_index must be >= 1".into()));
        }
        if self.placement.transient_retries > MAX_TRANSIENT_RETRIES {
            return Err(LogicError::Invalid(format!(
                "placement.transient_retries must be <= {MAX_TRANSIENT_RETRIES}"
            )));
        }
        if !self.span_epsilon.is_finite() || self.span_epsilon < 0.0 {
            return Err(LogicError::Invalid("span_epsilon must be finite and >= 0".into()));
        }
        Ok(())
    }

    pub fn recipe(&self, kind: SessionKind) -> Option<&KindRecipe> {
        self.kinds.get(&kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profile_is_valid_and_serializable() {
        let profile = LogicProfile::default();
        profile.validate().unwrap();
        let json = serde_json::to_string_pretty(&profile).unwrap();
        let back = LogicProfile::from_json(&json).unwrap();
        assert_eq!(back, profile);
        assert!(json.contains("\"MediaLibrary\""));
    }

    #[test]
    fn missing_kind_is_rejected() {
        let mut profile = LogicProfile::default();
        profile.kinds.shift_remove(&SessionKind::Timeline);
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("Timeline"));
    }

    #[test]
    fn retry_ceiling_is_enforced() {
        let mut profile = LogicProfile::default();
        profile.placement.transient_retries = MAX_TRANSIENT_RETRIES + 1;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn syntax_error_is_parse_error() {
        assert!(matches!(
            LogicProfile::from_json("{ not json"),
            Err(LogicError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logic.json");
        let mut profile = LogicProfile::default();
        profile.revision = "r2".into();
        let body = format!("\u{feff}{}", serde_json::to_string(&profile).unwrap());
        std::fs::write(&path, body).unwrap();
        assert_eq!(LogicProfile::load(&path).unwrap().revision, "r2");
        assert!(matches!(
            LogicProfile::load(&dir.path().join("missing.json")),
            Err(LogicError::Io { .. })
        ));
    }
}
