#![allow(clippy::needless_pass_by_value)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::error::AppError;
use crate::registry::catalog;
use crate::registry::params::HelpParams;
use crate::registry::{CommandOutput, CommandResult};
use crate::remote::value;
use crate::session::{Session, SessionKind};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusInfo {
    pub connected: bool,
    pub endpoint: String,
    pub logic_generation: u64,
    pub logic_revision: String,
    pub logic_source: String,
    pub product: Option<String>,
    pub version: Option<String>,
    pub project: Option<String>,
    pub timeline: Option<String>,
    pub api_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn read_string(session: &mut Session<'_>, kind: SessionKind, method: &str) -> Option<String> {
    session
        .invoke(kind, method, vec![])
        .ok()
        .and_then(|v| value::as_string(&v))
}

pub fn get_status(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let logic = state.logic();
    let port = state.api_port.load(Ordering::Relaxed);
    let mut info = StatusInfo {
        endpoint: logic.link().describe(),
        logic_generation: logic.generation(),
        logic_revision: logic.revision().to_string(),
        logic_source: state.controller.source(),
        api_port: (port != 0).then_some(port),
        ..StatusInfo::default()
    };

    logic.sessions().with_session(|s| {
        if let Err(e) = s.ensure(SessionKind::Application) {
            info.error = Some(e.to_string());
            return;
        }
        info.connected = true;
        info.product = read_string(s, SessionKind::Application, "GetProductName");
        info.version = read_string(s, SessionKind::Application, "GetVersionString");
        info.project = read_string(s, SessionKind::Project, "GetName");
        info.timeline = read_string(s, SessionKind::Timeline, "GetName");
    });

    let message = if info.connected {
        let mut parts = vec![format!(
            "Connected to {} {}",
            info.product.as_deref().unwrap_or("editor"),
            info.version.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string()];
        if let Some(project) = &info.project {
            parts.push(format!("project \"{project}\""));
        }
        match &info.timeline {
            Some(timeline) => parts.push(format!("timeline \"{timeline}\"")),
            None => parts.push("no open timeline".to_string()),
        }
        parts.push(format!("logic generation {}", info.logic_generation));
        parts.join(", ")
    } else {
        format!(
            "Not connected ({}): {}",
            info.endpoint,
            info.error.as_deref().unwrap_or("unknown error")
        )
    };
    Ok(CommandOutput::new(message, CommandResult::GetStatus(info)))
}

pub fn refresh(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let summary = state.logic().sessions().refresh_all()?;
    let unbound = if summary.unbound.is_empty() {
        String::new()
    } else {
        let names: Vec<String> = summary.unbound.iter().map(ToString::to_string).collect();
        format!(" Unbound: {}.", names.join(", "))
    };
    Ok(CommandOutput::new(
        format!("Session refreshed: {} handle(s) bound.{unbound}", summary.bound.len()),
        CommandResult::Refresh(summary),
    ))
}

/// A failed reload is reported, not raised: the previous logic keeps serving.
pub fn reload_logic(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let report = state.controller.reload();
    let message = match (report.success, report.error.as_deref()) {
        (true, None) => format!(
            "Logic reloaded from {}: generation {}, revision \"{}\".",
            report.source, report.generation, report.revision
        ),
        (true, Some(e)) => format!(
            "Logic reloaded (generation {}) but the editor is unreachable: {e}",
            report.generation
        ),
        (false, e) => format!(
            "Reload failed, generation {} still active: {}",
            report.generation,
            e.unwrap_or("unknown error")
        ),
    };
    Ok(CommandOutput::new(message, CommandResult::ReloadLogic(report)))
}

pub fn help(_state: &Arc<AppState>, p: HelpParams) -> Result<CommandOutput, AppError> {
    let text = catalog::help_text(p.topic.as_deref());
    Ok(CommandOutput::new(text.clone(), CommandResult::Help(text)))
}
