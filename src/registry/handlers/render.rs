#![allow(clippy::needless_pass_by_value)]

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::registry::params::StartRenderParams;
use crate::registry::{CommandOutput, CommandResult};
use crate::remote::value;
use crate::session::{Session, SessionKind};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RenderStatus {
    pub in_progress: bool,
    /// Percent complete, 0..=100.
    pub progress: i64,
}

fn require(s: &mut Session<'_>, method: &str, args: Vec<Value>) -> Result<Value, AppError> {
    let reply = s.invoke(SessionKind::Project, method, args)?;
    if !value::truthy(&reply) {
        return Err(AppError::RemoteError {
            message: format!("{method} was rejected by the editor"),
        });
    }
    Ok(reply)
}

pub fn start_render(state: &Arc<AppState>, p: StartRenderParams) -> Result<CommandOutput, AppError> {
    let mut settings = Map::new();
    if let Some(dir) = p.target_dir.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        settings.insert("TargetDir".to_string(), json!(dir));
    }
    if let Some(name) = p.custom_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        settings.insert("CustomName".to_string(), json!(name));
    }
    let job = state.with_session(|s| {
        // Rendering needs an open timeline.
        s.ensure(SessionKind::Timeline)?;
        if let Some(preset) = &p.preset {
            require(s, "LoadRenderPreset", vec![json!(preset)])?;
        }
        if !settings.is_empty() {
            require(s, "SetRenderSettings", vec![Value::Object(settings)])?;
        }
        let job = require(s, "AddRenderJob", vec![])?;
        require(s, "StartRendering", vec![])?;
        Ok::<_, AppError>(value::as_string(&job).unwrap_or_default())
    })?;
    Ok(CommandOutput::new(
        format!("Render job {job} started."),
        CommandResult::StartRender(job),
    ))
}

pub fn render_status(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let status = state.with_session(|s| {
        let running = s.invoke(SessionKind::Project, "IsRenderingInProgress", vec![])?;
        let progress = s.invoke(SessionKind::Project, "GetRenderingProgress", vec![])?;
        Ok::<_, AppError>(RenderStatus {
            in_progress: value::truthy(&running),
            progress: value::as_i64(&progress).unwrap_or(0).clamp(0, 100),
        })
    })?;
    let message = if status.in_progress {
        format!("Rendering: {}%.", status.progress)
    } else {
        "No render in progress.".to_string()
    };
    Ok(CommandOutput::new(message, CommandResult::RenderStatus(status)))
}
