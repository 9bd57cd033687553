pub mod catalog;
pub mod execute;
pub mod handlers;
pub mod params;
pub mod validation;

use serde::{Deserialize, Serialize};

// ── Param types (used in Command enum) ──────────────────────────
use params::{
    AddMarkerParams, BuildTimelineParams, CutListSource, HelpParams, ImportMediaParams,
    NameParams, PositionParams, StartRenderParams, TimelineItemsParams,
};

// ── Return types (used in CommandResult enum) ───────────────────
use crate::assembly::AssemblyReport;
use crate::cutlist::CutList;
use crate::reload::ReloadReport;
use crate::session::RefreshSummary;

use handlers::markers::MarkerInfo;
use handlers::media::MediaItemInfo;
use handlers::playback::PlayheadInfo;
use handlers::render::RenderStatus;
use handlers::session::StatusInfo;
use handlers::timeline::{TimelineItemInfo, TimelineSummary};

// ── Handler modules (dispatch targets) ──────────────────────────
use handlers::{assembly, markers, media, playback, project, render, session, timeline};

// ── Command metadata ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandCategory {
    Session,
    Project,
    Timeline,
    Media,
    Assembly,
    Playback,
    Markers,
    Render,
}

impl CommandCategory {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Project => "project",
            Self::Timeline => "timeline",
            Self::Media => "media",
            Self::Assembly => "assembly",
            Self::Playback => "playback",
            Self::Markers => "markers",
            Self::Render => "render",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Session => "Connection status, session refresh, logic reload",
            Self::Project => "Create, load and save projects",
            Self::Timeline => "Create, list, switch and inspect timelines",
            Self::Media => "Browse and import media library items",
            Self::Assembly => "Validate cut lists and build timelines from them",
            Self::Playback => "Playhead and composition inserts",
            Self::Markers => "Timeline markers",
            Self::Render => "Queue and monitor renders",
        }
    }

    pub fn all() -> &'static [CommandCategory] {
        &[
            Self::Session,
            Self::Project,
            Self::Timeline,
            Self::Media,
            Self::Assembly,
            Self::Playback,
            Self::Markers,
            Self::Render,
        ]
    }
}

pub struct CommandInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub category: CommandCategory,
    /// Changes state in the editor.
    pub mutating: bool,
}

// ── Command output ──────────────────────────────────────────────

/// Internal result of executing a Command.
/// `message` serves the CLI and logs, `result` carries typed data for API clients.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub message: String,
    pub result: CommandResult,
}

impl CommandOutput {
    pub fn new(message: impl Into<String>, result: CommandResult) -> Self {
        Self {
            message: message.into(),
            result,
        }
    }
}

// ── define_commands! macro ──────────────────────────────────────

/// Single source of truth for all commands. Generates:
/// 1. `Command` enum (serde-tagged)
/// 2. `CommandResult` enum (serde-tagged)
/// 3. `Command::info()`: name, description, category, mutating
/// 4. `Command::dispatch()`
/// 5. `Command::registry_entries()`: catalog entries with JSON schemas
/// 6. `Command::from_tool_call()`: deserialize from a (name, JSON) pair
macro_rules! define_commands {
    (
        params {
            $(
                [ $pc:expr $(, $pf:ident)* ]
                $pv:ident ( $pp:ty ) $( -> $pr:ty )?
                => $ph:path, $pn:literal : $pd:literal ;
            )*
        }
        no_params {
            $(
                [ $nc:expr $(, $nf:ident)* ]
                $nv:ident $( -> $nr:ty )?
                => $nh:path, $nn:literal : $nd:literal ;
            )*
        }
    ) => {
        // ── 1. Command enum ──
        /// Unified command type. The HTTP API and the CLI dispatch through the
        /// same executor. Adding a variant causes compiler errors until it's
        /// fully handled.
        #[derive(Debug, Clone, Serialize, Deserialize)]
        #[serde(tag = "command", content = "params")]
        pub enum Command {
            $( $pv($pp), )*
            $( $nv, )*
        }

        // ── 2. CommandResult enum ──
        #[derive(Debug, Clone, Serialize)]
        #[serde(tag = "command", content = "data")]
        pub enum CommandResult {
            $( $pv $( ($pr) )?, )*
            $( $nv $( ($nr) )?, )*
        }

        // ── 3. Command::info() ──
        impl Command {
            pub fn info(&self) -> CommandInfo {
                match self {
                    $( Command::$pv(_) => CommandInfo {
                        name: $pn,
                        description: $pd,
                        category: $pc,
                        mutating: define_commands!(@has_flag mutating; $($pf)*),
                    }, )*
                    $( Command::$nv => CommandInfo {
                        name: $nn,
                        description: $nd,
                        category: $nc,
                        mutating: define_commands!(@has_flag mutating; $($nf)*),
                    }, )*
                }
            }
        }

        // ── 4. Command::dispatch() ──
        impl Command {
            pub(crate) fn dispatch(
                self,
                state: &std::sync::Arc<crate::state::AppState>,
            ) -> Result<CommandOutput, crate::error::AppError> {
                match self {
                    $( Command::$pv(p) => $ph(state, p), )*
                    $( Command::$nv => $nh(state), )*
                }
            }
        }

        // ── 5. Command::registry_entries() ──
        impl Command {
            pub(crate) fn registry_entries() -> Vec<catalog::CommandRegistryEntry> {
                vec![
                    $( catalog::entry(
                        CommandInfo {
                            name: $pn,
                            description: $pd,
                            category: $pc,
                            mutating: define_commands!(@has_flag mutating; $($pf)*),
                        },
                        catalog::schema_value::<$pp>(),
                    ), )*
                    $( catalog::entry(
                        CommandInfo {
                            name: $nn,
                            description: $nd,
                            category: $nc,
                            mutating: define_commands!(@has_flag mutating; $($nf)*),
                        },
                        catalog::empty_object_schema(),
                    ), )*
                ]
            }
        }

        // ── 6. Command::from_tool_call() ──
        impl Command {
            pub(crate) fn from_tool_call(
                name: &str,
                input: &serde_json::Value,
            ) -> Result<Command, crate::error::AppError> {
                match name {
                    $( $pn => Ok(Command::$pv(catalog::de(input)?)), )*
                    $( $nn => Ok(Command::$nv), )*
                    _ => Err(crate::error::AppError::UnknownCommand {
                        name: name.to_string(),
                    }),
                }
            }
        }
    };

    // Flag helper: literal tokens match before metavariables, so `mutating`
    // matches the first arm and any other ident falls through to the second.
    (@has_flag mutating; mutating $($rest:ident)*) => { true };
    (@has_flag mutating; $_other:ident $($rest:ident)*) => { define_commands!(@has_flag mutating; $($rest)*) };
    (@has_flag mutating;) => { false };
}

// ── Command definitions ─────────────────────────────────────────

define_commands! {
    params {
        // ── Session (1) ─────────────────────────────────────────
        [CommandCategory::Session]
        Help(HelpParams) -> String
        => session::help, "help": "Discover available commands and categories. Call with no args for all categories, or with a topic for details.";

        // ── Project (2) ─────────────────────────────────────────
        [CommandCategory::Project, mutating]
        CreateProject(NameParams) -> String
        => project::create_project, "create_project": "Create a project and make it current.";

        [CommandCategory::Project, mutating]
        LoadProject(NameParams) -> String
        => project::load_project, "load_project": "Load a project by name and make it current.";

        // ── Timeline (4) ────────────────────────────────────────
        [CommandCategory::Timeline, mutating]
        CreateTimeline(NameParams) -> TimelineSummary
        => timeline::create_timeline, "create_timeline": "Create an empty timeline and make it current.";

        [CommandCategory::Timeline, mutating]
        SetCurrentTimeline(NameParams) -> TimelineSummary
        => timeline::set_current_timeline, "set_current_timeline": "Switch the current timeline by name.";

        [CommandCategory::Timeline, mutating]
        DeleteTimeline(NameParams)
        => timeline::delete_timeline, "delete_timeline": "Delete a timeline by name.";

        [CommandCategory::Timeline]
        GetTimelineItems(TimelineItemsParams) -> Vec<TimelineItemInfo>
        => timeline::get_timeline_items, "get_timeline_items": "List items on a video track of the current timeline.";

        // ── Media (1) ───────────────────────────────────────────
        [CommandCategory::Media, mutating]
        ImportMedia(ImportMediaParams) -> Vec<MediaItemInfo>
        => media::import_media, "import_media": "Import files into the media library root.";

        // ── Assembly (2) ────────────────────────────────────────
        [CommandCategory::Assembly, mutating]
        BuildTimeline(BuildTimelineParams) -> Box<AssemblyReport>
        => assembly::build_timeline, "build_timeline": "Validate a cut list and build its timeline. Placeholder compositions go in first, then clips at their record frames.";

        [CommandCategory::Assembly]
        ValidateCutList(CutListSource) -> CutList
        => assembly::validate_cut_list, "validate_cut_list": "Validate a cut list without touching the editor. Reports every problem at once.";

        // ── Playback (2) ────────────────────────────────────────
        [CommandCategory::Playback, mutating]
        SetPlayhead(PositionParams) -> PlayheadInfo
        => playback::set_playhead, "set_playhead": "Move the playhead to a position in seconds or a timecode.";

        [CommandCategory::Playback, mutating]
        InsertFusionComposition(PositionParams) -> PlayheadInfo
        => playback::insert_fusion_composition, "insert_fusion_composition": "Insert a composition at a position (or the playhead). Ripples later items.";

        // ── Markers (1) ─────────────────────────────────────────
        [CommandCategory::Markers, mutating]
        AddTimelineMarker(AddMarkerParams) -> MarkerInfo
        => markers::add_timeline_marker, "add_timeline_marker": "Add a marker to the current timeline.";

        // ── Render (1) ──────────────────────────────────────────
        [CommandCategory::Render, mutating]
        StartRender(StartRenderParams) -> String
        => render::start_render, "start_render": "Queue a render job for the current timeline and start rendering.";
    }
    no_params {
        // ── Session (3) ─────────────────────────────────────────
        [CommandCategory::Session]
        GetStatus -> StatusInfo
        => session::get_status, "get_status": "Connection, logic generation, current project and timeline.";

        [CommandCategory::Session]
        Refresh -> RefreshSummary
        => session::refresh, "refresh": "Re-derive every session handle, e.g. after switching projects in the editor UI.";

        [CommandCategory::Session]
        ReloadLogic -> ReloadReport
        => session::reload_logic, "reload_logic": "Reload the session logic profile without dropping the connection.";

        // ── Project (1) ─────────────────────────────────────────
        [CommandCategory::Project, mutating]
        SaveProject => project::save_project, "save_project": "Save the current project.";

        // ── Timeline (1) ────────────────────────────────────────
        [CommandCategory::Timeline]
        ListTimelines -> Vec<TimelineSummary>
        => timeline::list_timelines, "list_timelines": "List timelines in the current project.";

        // ── Media (1) ───────────────────────────────────────────
        [CommandCategory::Media]
        ListMediaPool -> Vec<MediaItemInfo>
        => media::list_media_pool, "list_media_pool": "List every media library item with its bin path.";

        // ── Markers (1) ─────────────────────────────────────────
        [CommandCategory::Markers]
        GetTimelineMarkers -> Vec<MarkerInfo>
        => markers::get_timeline_markers, "get_timeline_markers": "List markers on the current timeline.";

        // ── Render (1) ──────────────────────────────────────────
        [CommandCategory::Render]
        RenderStatus -> RenderStatus
        => render::render_status, "render_status": "Whether a render is running and its progress.";
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_command_is_registered_once() {
        let entries = Command::registry_entries();
        let mut names: Vec<&str> = entries.iter().map(|e| e.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(names.len(), before);
        for name in [
            "get_status", "refresh", "reload_logic", "help", "create_project", "load_project",
            "save_project", "create_timeline", "list_timelines", "set_current_timeline",
            "delete_timeline", "get_timeline_items", "list_media_pool", "import_media",
            "build_timeline", "validate_cut_list", "set_playhead", "insert_fusion_composition",
            "add_timeline_marker", "get_timeline_markers", "start_render", "render_status",
        ] {
            assert!(names.contains(&name), "missing {name}");
        }
    }

    #[test]
    fn tool_call_round_trip() {
        let cmd = Command::from_tool_call("set_playhead", &json!({ "seconds": 2.5 })).unwrap();
        let info = cmd.info();
        assert_eq!(info.name, "set_playhead");
        assert!(info.mutating);
        assert_eq!(info.category, CommandCategory::Playback);

        let cmd = Command::from_tool_call("list_timelines", &json!({})).unwrap();
        assert!(!cmd.info().mutating);
    }

    #[test]
    fn unknown_and_malformed_calls_are_errors() {
        assert!(matches!(
            Command::from_tool_call("nope", &json!({})),
            Err(crate::error::AppError::UnknownCommand { .. })
        ));
        assert!(Command::from_tool_call("create_project", &json!({})).is_err());
    }

    #[test]
    fn commands_serialize_tagged() {
        let cmd = Command::LoadProject(NameParams { name: "Reel 1".into() });
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["command"], "LoadProject");
        assert_eq!(json["params"]["name"], "Reel 1");
    }
}
