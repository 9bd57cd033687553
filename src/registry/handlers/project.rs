#![allow(clippy::needless_pass_by_value)]

use std::sync::Arc;

use serde_json::json;

use crate::error::AppError;
use crate::registry::params::NameParams;
use crate::registry::validation::require_name;
use crate::registry::{CommandOutput, CommandResult};
use crate::remote::value;
use crate::session::SessionKind;
use crate::state::AppState;

pub fn create_project(state: &Arc<AppState>, p: NameParams) -> Result<CommandOutput, AppError> {
    let name = require_name(&p.name, "Project")?;
    state.with_session(|s| {
        let reply = s.invoke(SessionKind::ProjectManager, "CreateProject", vec![json!(name)])?;
        let project = value::object(&reply).ok_or_else(|| AppError::ValidationError {
            message: format!("Could not create project \"{name}\" (name already in use?)"),
        })?;
        s.adopt(SessionKind::Project, project);
        Ok::<_, AppError>(())
    })?;
    Ok(CommandOutput::new(
        format!("Created project \"{name}\"."),
        CommandResult::CreateProject(name),
    ))
}

pub fn load_project(state: &Arc<AppState>, p: NameParams) -> Result<CommandOutput, AppError> {
    let name = require_name(&p.name, "Project")?;
    state.with_session(|s| {
        let reply = s.invoke(SessionKind::ProjectManager, "LoadProject", vec![json!(name)])?;
        let project = value::object(&reply).ok_or_else(|| AppError::NotFound {
            what: format!("Project \"{name}\""),
        })?;
        s.adopt(SessionKind::Project, project);
        Ok::<_, AppError>(())
    })?;
    Ok(CommandOutput::new(
        format!("Loaded project \"{name}\"."),
        CommandResult::LoadProject(name),
    ))
}

pub fn save_project(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let name = state.with_session(|s| {
        let name = s.invoke(SessionKind::Project, "GetName", vec![])?;
        let saved = s.invoke(SessionKind::ProjectManager, "SaveProject", vec![])?;
        if !value::truthy(&saved) {
            return Err(AppError::RemoteError {
                message: "the editor refused to save the project".to_string(),
            });
        }
        Ok::<_, AppError>(value::as_string(&name).unwrap_or_default())
    })?;
    Ok(CommandOutput::new(
        format!("Saved project \"{name}\"."),
        CommandResult::SaveProject,
    ))
}
