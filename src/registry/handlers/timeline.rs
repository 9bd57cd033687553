#![allow(clippy::needless_pass_by_value)]

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::assembly;
use crate::error::AppError;
use crate::registry::params::{NameParams, TimelineItemsParams};
use crate::registry::validation::{require_name, validate_track_index};
use crate::registry::{CommandOutput, CommandResult};
use crate::remote::{value, ObjectRef};
use crate::session::{Session, SessionKind};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct TimelineSummary {
    /// 1-based index in the project.
    pub index: i64,
    pub name: String,
    pub id: Option<String>,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineItemInfo {
    pub name: String,
    pub start: i64,
    pub end: i64,
    pub duration: i64,
    pub start_timecode: String,
    /// Seconds from the start of the timeline.
    pub start_seconds: f64,
}

fn current_timeline_id(s: &mut Session<'_>) -> Option<String> {
    s.invoke(SessionKind::Timeline, "GetUniqueId", vec![])
        .ok()
        .and_then(|v| value::as_string(&v))
}

fn summarize(
    s: &mut Session<'_>,
    index: i64,
    timeline: &ObjectRef,
    current_id: Option<&str>,
) -> Result<TimelineSummary, AppError> {
    let name = value::as_string(&s.call(timeline, "GetName", vec![])?).unwrap_or_default();
    let id = value::as_string(&s.call(timeline, "GetUniqueId", vec![])?);
    let current = id.is_some() && id.as_deref() == current_id;
    Ok(TimelineSummary {
        index,
        name,
        id,
        current,
    })
}

fn all_timelines(s: &mut Session<'_>) -> Result<Vec<TimelineSummary>, AppError> {
    let current_id = current_timeline_id(s);
    let count = s.invoke(SessionKind::Project, "GetTimelineCount", vec![])?;
    let count = value::as_i64(&count).unwrap_or(0);
    let mut timelines = Vec::new();
    for index in 1..=count {
        let reply = s.invoke(SessionKind::Project, "GetTimelineByIndex", vec![json!(index)])?;
        let Some(timeline) = value::object(&reply) else { continue };
        timelines.push(summarize(s, index, &timeline, current_id.as_deref())?);
    }
    Ok(timelines)
}

fn named(s: &mut Session<'_>, name: &str) -> Result<TimelineSummary, AppError> {
    all_timelines(s)?
        .into_iter()
        .find(|t| t.name == name)
        .ok_or_else(|| AppError::NotFound {
            what: format!("Timeline \"{name}\""),
        })
}

pub fn list_timelines(state: &Arc<AppState>) -> Result<CommandOutput, AppError> {
    let timelines = state.with_session(all_timelines)?;
    let message = if timelines.is_empty() {
        "No timelines in the current project.".to_string()
    } else {
        let names: Vec<String> = timelines
            .iter()
            .map(|t| {
                if t.current {
                    format!("{} (current)", t.name)
                } else {
                    t.name.clone()
                }
            })
            .collect();
        format!("{} timeline(s): {}", timelines.len(), names.join(", "))
    };
    Ok(CommandOutput::new(message, CommandResult::ListTimelines(timelines)))
}

pub fn create_timeline(state: &Arc<AppState>, p: NameParams) -> Result<CommandOutput, AppError> {
    let name = require_name(&p.name, "Timeline")?;
    let summary = state.with_session(|s| {
        if assembly::find_timeline(s, &name)?.is_some() {
            return Err(AppError::TimelineExists { name: name.clone() });
        }
        assembly::create_timeline(s, &name)?;
        named(s, &name)
    })?;
    Ok(CommandOutput::new(
        format!("Created timeline \"{name}\"."),
        CommandResult::CreateTimeline(summary),
    ))
}

pub fn set_current_timeline(state: &Arc<AppState>, p: NameParams) -> Result<CommandOutput, AppError> {
    let name = require_name(&p.name, "Timeline")?;
    let summary = state.with_session(|s| {
        let timeline = assembly::find_timeline(s, &name)?.ok_or_else(|| AppError::NotFound {
            what: format!("Timeline \"{name}\""),
        })?;
        let switched = s.invoke(
            SessionKind::Project,
            "SetCurrentTimeline",
            vec![timeline.to_value()],
        )?;
        if !value::truthy(&switched) {
            return Err(AppError::RemoteError {
                message: format!("the editor refused to switch to \"{name}\""),
            });
        }
        s.adopt(SessionKind::Timeline, timeline);
        named(s, &name)
    })?;
    Ok(CommandOutput::new(
        format!("Current timeline is now \"{name}\"."),
        CommandResult::SetCurrentTimeline(summary),
    ))
}

pub fn delete_timeline(state: &Arc<AppState>, p: NameParams) -> Result<CommandOutput, AppError> {
    let name = require_name(&p.name, "Timeline")?;
    state.with_session(|s| {
        let timeline = assembly::find_timeline(s, &name)?.ok_or_else(|| AppError::NotFound {
            what: format!("Timeline \"{name}\""),
        })?;
        let deleted = s.invoke(
            SessionKind::MediaLibrary,
            "DeleteTimelines",
            vec![json!([timeline.to_value()])],
        )?;
        if !value::truthy(&deleted) {
            return Err(AppError::RemoteError {
                message: format!("the editor refused to delete \"{name}\""),
            });
        }
        // The cached timeline may have been the one deleted.
        s.forget(SessionKind::Timeline);
        Ok(())
    })?;
    Ok(CommandOutput::new(
        format!("Deleted timeline \"{name}\"."),
        CommandResult::DeleteTimeline,
    ))
}

pub fn get_timeline_items(
    state: &Arc<AppState>,
    p: TimelineItemsParams,
) -> Result<CommandOutput, AppError> {
    validate_track_index(p.track_index)?;
    let clock = state.clock()?;
    let (timeline_name, items) = state.with_session(|s| {
        let timeline_name = s.invoke(SessionKind::Timeline, "GetName", vec![])?;
        let reply = s.invoke(
            SessionKind::Timeline,
            "GetItemListInTrack",
            vec![json!("video"), json!(p.track_index)],
        )?;
        let mut items = Vec::new();
        for item in value::objects(reply) {
            let name = value::as_string(&s.call(&item, "GetName", vec![])?).unwrap_or_default();
            let start = value::as_i64(&s.call(&item, "GetStart", vec![])?).unwrap_or(0);
            let end = value::as_i64(&s.call(&item, "GetEnd", vec![])?).unwrap_or(start);
            items.push(TimelineItemInfo {
                name,
                start,
                end,
                duration: end - start,
                start_timecode: clock.timecode(start),
                start_seconds: clock.seconds(start),
            });
        }
        Ok::<_, AppError>((value::as_string(&timeline_name).unwrap_or_default(), items))
    })?;
    Ok(CommandOutput::new(
        format!(
            "{} item(s) on video track {} of \"{timeline_name}\".",
            items.len(),
            p.track_index
        ),
        CommandResult::GetTimelineItems(items),
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
    fn create_list_switch_delete() {
        let peer = FakeResolve::new();
        let (state, _dir) = state_with(&peer);
        execute_tool_call(&state, "test", "create_timeline", &json!({ "name": "A" })).unwrap();
        execute_tool_call(&state, "test", "create_timeline", &json!({ "name": "B" })).unwrap();

        let out = execute_tool_call(&state, "test", "list_timelines", &json!({})).unwrap();
        let CommandResult::ListTimelines(list) = out.result else { panic!() };
        assert_eq!(list.len(), 2);
        assert!(list[1].current);
        assert!(!list[0].current);

        let out = execute_tool_call(&state, "test", "set_current_timeline", &json!({ "name": "A" }))
            .unwrap();
        let CommandResult::SetCurrentTimeline(summary) = out.result else { panic!() };
        assert!(summary.current);
        assert_eq!(summary.index, 1);

        execute_tool_call(&state, "test", "delete_timeline", &json!({ "name": "A" })).unwrap();
        assert_eq!(peer.timeline_names(), vec!["B".to_string()]);
    }

    #[test]
    fn duplicate_name_is_refused() {
        let (state, _dir) = state_with(&FakeResolve::new());
        execute_tool_call(&state, "test", "create_timeline", &json!({ "name": "A" })).unwrap();
        let err = execute_tool_call(&state, "test", "create_timeline", &json!({ "name": "A" }))
            .unwrap_err();
        assert!(matches!(err, AppError::TimelineExists { .. }));
    }

    #[test]
    fn unknown_timeline_is_not_found() {
        let (state, _dir) = state_with(&FakeResolve::new());
        let err = execute_tool_call(&state, "test", "delete_timeline", &json!({ "name": "Nope" }))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn items_without_open_timeline_report_disconnected_timeline() {
        let (state, _dir) = state_with(&FakeResolve::new());
        let err = execute_tool_call(&state, "test", "get_timeline_items", &json!({})).unwrap_err();
        assert!(matches!(
            err,
            AppError::Disconnected {
                kind: SessionKind::Timeline,
                ..
            }
        ));
    }

    #[test]
    fn items_report_timecode_and_seconds() {
        let (state, _dir) = state_with(&FakeResolve::demo());
        let cut = json!({
            "name": "Items",
            "clips": [
                { "shot_id": "S1", "file": "A001_C001.mov", "timeline_start": 2.0,
                  "timeline_end": 4.0, "clip_in": 0.0, "clip_out": 2.0 }
            ]
        });
        execute_tool_call(&state, "test", "build_timeline", &json!({ "cut_list": cut })).unwrap();
        let out = execute_tool_call(&state, "test", "get_timeline_items", &json!({})).unwrap();
        let CommandResult::GetTimelineItems(items) = out.result else { panic!() };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "A001_C001.mov");
        assert_eq!(items[0].start, 86_448);
        assert_eq!(items[0].duration, 48);
        assert_eq!(items[0].start_timecode, "01:00:02:00");
        assert!((items[0].start_seconds - 2.0).abs() < 1e-9);
    }
}
