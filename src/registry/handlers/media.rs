#![allow(clippy::needless_pass_by_value)]

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::error::AppError;
use crate::registry::params::ImportMediaParams;
use crate::registry::{CommandOutput, CommandResult};
use crate::remote::{value, ObjectRef};
use crate::session::{Session, SessionKind};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct MediaItemInfo {
    pub name: String,
    /// Bin path from the root folder, e.g. `Master/Interviews`.
    pub bin: String,
    pub frames: Option<i64>,
}

fn describe_clip(s: &mut Session<'_>, clip: &ObjectRef, bin: &str) -> Result<MediaItemInfo, AppError> {
    let name = s.call(clip, "GetClipProperty", vec![json!("Clip Name")])?;
    let frames = s.call(clip, "GetClipProperty", vec![json!("Frames")])?;
    Ok(MediaItemInfo {
        name: value::as_string(&name).unwrap_or_default(),
        bin: bin.to_string(),
        frames: value::as_i64(&frames),
    })
}

/// Breadth-first walk of the media library, root bin first.
fn walk(s: &mut Session<'_>) -> Result<Vec<MediaItemInfo>, AppError> {
    let root = s.invoke(SessionKind::MediaLibrary, "GetRootFolder", vec![])?;
    let root = value::object(&root).ok_or_else(|| AppError::RemoteError {
        message: "media library has no root folder".to_string(),
    })?;
    let root_name = value::as_string(&s.call(&root, "GetName", vec![])?)
        .unwrap_or_else(|| "Master".to_string());

    let mut items = Vec::new();
    let mut queue = VecDeque::from([(root, root_name)]);
    while let Some((folder, path)) = queue.pop_front() {
        for clip in value::objects(s.call(&folder, "GetClips", vec![])?) {
            items.push(describe_clip(s, &clip, &path)?);
        }
        for sub in value::objects(s.call(&folder, "GetSubFolders", vec![])?) {
            let name = value::as_string(&s.call(&sub, "GetName", vec![])?).unwrap_or_default();
            queue.push_back((sub, format!("{path}/{name}")));
        }
    }
    Ok(items)
}

pub fn list_media_pool(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let items = state.with_session(walk)?;
    Ok(CommandOutput::new(
        format!("{} media item(s).", items.len()),
        CommandResult::ListMediaPool(items),
    ))
}

pub fn import_media(state: &Arc<AppState>, p: ImportMediaParams) -> Result<CommandOutput, AppError> {
    let paths: Vec<String> = p
        .paths
        .iter()
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect();
    if paths.is_empty() {
        return Err(AppError::ValidationError {
            message: "paths must contain at least one file".to_string(),
        });
    }
    let imported = state.with_session(|s| {
        let reply = s.invoke(SessionKind::MediaLibrary, "ImportMedia", vec![json!(paths)])?;
        let root = s.invoke(SessionKind::MediaLibrary, "GetRootFolder", vec![])?;
        let bin = value::object(&root)
            .map(|r| s.call(&r, "GetName", vec![]))
            .transpose()?
            .and_then(|n| value::as_string(&n))
            .unwrap_or_else(|| "Master".to_string());
        value::objects(reply)
            .iter()
            .map(|clip| describe_clip(s, clip, &bin))
            .collect::<Result<Vec<_>, AppError>>()
    })?;
    if imported.is_empty() {
        return Err(AppError::RemoteError {
            message: "the editor imported none of the given files".to_string(),
        });
    }
    let names: Vec<&str> = imported.iter().map(|i| i.name.as_str()).collect();
    Ok(CommandOutput::new(
        format!("Imported {} item(s): {}", imported.len(), names.join(", ")),
        CommandResult::ImportMedia(imported),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::registry::execute::execute_tool_call;
    use crate::remote::fake::FakeResolve;
    use crate::state::test_support::state_with;

    #[test]
    fn lists_nested_bins_root_first() {
        let (state, _dir) = state_with(&FakeResolve::demo());
        let out = execute_tool_call(&state, "test", "list_media_pool", &json!({})).unwrap();
        let CommandResult::ListMediaPool(items) = out.result else { panic!() };
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].name, "A001_C001.mov");
        assert_eq!(items[0].bin, "Master");
        assert_eq!(items[0].frames, Some(480));
        let drone = items.iter().find(|i| i.name == "DRONE_04.mp4").unwrap();
        assert_eq!(drone.bin, "Master/Broll");
    }

    #[test]
    fn import_adds_to_root_bin() {
        let (state, _dir) = state_with(&FakeResolve::new());
        let out = execute_tool_call(
            &state,
            "test",
            "import_media",
            &json!({ "paths": ["/footage/day1/B002_C010.mov"] }),
        )
        .unwrap();
        let CommandResult::ImportMedia(items) = out.result else { panic!() };
        assert_eq!(items[0].name, "B002_C010.mov");
        assert_eq!(items[0].bin, "Master");

        let out = execute_tool_call(&state, "test", "list_media_pool", &json!({})).unwrap();
        let CommandResult::ListMediaPool(items) = out.result else { panic!() };
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn import_requires_paths() {
        let (state, _dir) = state_with(&FakeResolve::new());
        let err = execute_tool_call(&state, "test", "import_media", &json!({ "paths": [" "] }))
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }
}
