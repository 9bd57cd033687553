//! Centralized path definitions for all data files and directories.
//!
//! No other module should hard-code these strings. Functions take the config
//! directory explicitly so they work in both the server and the CLI.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "com.resolvepilot.app";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const LOGIC_FILE: &str = "logic.json";
pub const PORT_FILE: &str = ".resolve-pilot-port";

// ── Directory names ──────────────────────────────────────────────

pub const AUDIT_LOGS_DIR: &str = "tool-logs";

// ── Config-dir functions (take app_config_dir) ───────────────────

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

/// Default location of the reloadable logic profile when settings name none.
pub fn logic_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(LOGIC_FILE)
}

pub fn audit_logs_dir(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(AUDIT_LOGS_DIR)
}

pub fn port_file_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(PORT_FILE)
}

/// `<platform config dir>/com.resolvepilot.app`, from `APPDATA`,
/// `XDG_CONFIG_HOME`, or `~/.config` (macOS uses `~/Library/Application Support`).
pub fn default_app_config_dir() -> PathBuf {
    platform_config_dir().join(APP_ID)
}

fn platform_config_dir() -> PathBuf {
    if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    if cfg!(target_os = "macos") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config");
    }
    PathBuf::from(".")
}
