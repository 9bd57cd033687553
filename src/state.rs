use std::path::PathBuf;
use std::sync::atomic::AtomicU16;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::AppError;
use crate::reload::{BuiltinLogicSource, FileLogicSource, LiveReloadController, LogicSource, ResolveLogic};
use crate::remote::bridge::BridgeTransport;
use crate::remote::Transport;
use crate::session::Session;
use crate::settings::AppSettings;
use crate::timecode::FrameClock;

// ── Application State ──────────────────────────────────────────────

/// Application state shared by the HTTP API and the CLI.
pub struct AppState {
    pub controller: LiveReloadController,
    pub settings: Mutex<AppSettings>,
    pub app_config_dir: PathBuf,
    /// Port the HTTP API is listening on (0 = not running).
    pub api_port: AtomicU16,
}

impl AppState {
    /// Connect to the editor through `transport` and load the first logic
    /// generation from the source named in `settings`.
    pub fn connect(
        app_config_dir: PathBuf,
        settings: AppSettings,
        transport: Box<dyn Transport>,
    ) -> Result<Self, AppError> {
        let source = logic_source(&settings, &app_config_dir);
        let controller = LiveReloadController::start(transport, source)?;
        Ok(Self {
            controller,
            settings: Mutex::new(settings),
            app_config_dir,
            api_port: AtomicU16::new(0),
        })
    }

    /// The logic generation serving requests right now.
    pub fn logic(&self) -> Arc<ResolveLogic> {
        self.controller.current()
    }

    /// Exclusive access to the current generation's session for the duration of `f`.
    pub fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session<'_>) -> R,
    {
        let logic = self.logic();
        logic.sessions().with_session(f)
    }

    /// Read-only access to settings.
    pub fn with_settings<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppSettings) -> R,
    {
        let guard = self.settings.lock();
        f(&guard)
    }

    pub fn clock(&self) -> Result<FrameClock, AppError> {
        self.with_settings(|s| s.timeline.clock())
            .map_err(|e| AppError::ValidationError {
                message: e.to_string(),
            })
    }

    /// Span tolerance for cut-list validation: settings override, else the
    /// current logic profile.
    pub fn span_epsilon(&self) -> f64 {
        self.with_settings(|s| s.assembly.span_epsilon)
            .unwrap_or_else(|| self.logic().profile().span_epsilon)
    }
}

/// Transport to the scripting bridge configured in `settings`.
pub fn bridge_transport(settings: &AppSettings) -> Result<Box<dyn Transport>, AppError> {
    let transport = BridgeTransport::new(&settings.bridge.url, settings.bridge.timeout())?;
    Ok(Box::new(transport))
}

fn logic_source(settings: &AppSettings, app_config_dir: &std::path::Path) -> Box<dyn LogicSource> {
    match settings.resolved_logic_path(app_config_dir) {
        Some(path) => Box::new(FileLogicSource::new(path)),
        None => Box::new(BuiltinLogicSource),
    }
}
