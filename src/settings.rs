use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assembly::{AssemblyOptions, ExistingTimeline};
use crate::storage::{read_json, write_json, StorageError};
use crate::timecode::{FrameClock, TimecodeError, DEFAULT_FPS, DEFAULT_FRAME_OFFSET};

pub const BRIDGE_URL_ENV: &str = "RESOLVE_PILOT_BRIDGE_URL";
pub const LOGIC_PATH_ENV: &str = "RESOLVE_PILOT_LOGIC";

pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:9237";
const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 10_000;

// ── Sections ─────────────────────────────────────────────────────

/// How to reach the scripting bridge next to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BRIDGE_URL.to_string(),
            timeout_ms: DEFAULT_BRIDGE_TIMEOUT_MS,
        }
    }
}

impl BridgeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSettings {
    pub fps: f64,
    /// Record frame of the first frame of a new timeline.
    pub frame_offset: i64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            frame_offset: DEFAULT_FRAME_OFFSET,
        }
    }
}

impl TimelineSettings {
    pub fn clock(&self) -> Result<FrameClock, TimecodeError> {
        FrameClock::new(self.fps, self.frame_offset)
    }
}

/// Defaults applied to `build_timeline` when the caller leaves a field out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyDefaults {
    #[serde(default)]
    pub insert_placeholder_composition: bool,
    #[serde(default)]
    pub on_existing: ExistingTimeline,
    /// Overrides the logic profile's span tolerance.
    #[serde(default)]
    pub span_epsilon: Option<f64>,
}

impl AssemblyDefaults {
    pub fn options(&self) -> AssemblyOptions {
        AssemblyOptions {
            insert_placeholder_composition: self.insert_placeholder_composition,
            on_existing: self.on_existing,
            track_index: None,
        }
    }
}

// ── App settings ─────────────────────────────────────────────────

/// Application-level settings stored in the OS config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub version: u32,
    #[serde(default)]
    pub bridge: BridgeSettings,
    /// Port for the HTTP tool API. None = any free port.
    #[serde(default)]
    pub api_port: Option<u16>,
    #[serde(default)]
    pub timeline: TimelineSettings,
    #[serde(default)]
    pub assembly: AssemblyDefaults,
    /// Reloadable logic profile. None = `logic.json` in the config dir if it
    /// exists, otherwise the built-in profile.
    #[serde(default)]
    pub logic_path: Option<PathBuf>,
}

const SETTINGS_VERSION: u32 = 1;

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            bridge: BridgeSettings::default(),
            api_port: None,
            timeline: TimelineSettings::default(),
            assembly: AssemblyDefaults::default(),
            logic_path: None,
        }
    }
}

impl AppSettings {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BRIDGE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(%url, "bridge URL overridden from environment");
            self.bridge.url = url.trim().to_string();
        }
        if let Some(path) = lookup(LOGIC_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(%path, "logic profile overridden from environment");
            self.logic_path = Some(PathBuf::from(path.trim()));
        }
    }

    /// The logic profile file to use, if any.
    pub fn resolved_logic_path(&self, app_config_dir: &Path) -> Option<PathBuf> {
        self.logic_path.clone().or_else(|| {
            let default = crate::paths::logic_path(app_config_dir);
            default.exists().then_some(default)
        })
    }
}

/// Load settings from the app config directory. Returns None if no settings
/// file exists or it cannot be read.
pub fn load_settings(app_config_dir: &Path) -> Option<AppSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<AppSettings>(&path) {
        Ok(settings) => {
            if settings.version > SETTINGS_VERSION {
                tracing::warn!(
                    version = settings.version,
                    supported = SETTINGS_VERSION,
                    "settings file is newer than this build"
                );
            }
            Some(settings)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            None
        }
    }
}

/// Settings from disk (or defaults) with environment overrides applied.
pub fn load_effective(app_config_dir: &Path) -> AppSettings {
    let mut settings = load_settings(app_config_dir).unwrap_or_default();
    settings.apply_overrides(|key| std::env::var(key).ok());
    settings
}

/// Save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &AppSettings) -> Result<(), StorageError> {
    std::fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}
