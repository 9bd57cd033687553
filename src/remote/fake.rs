//! In-memory scripting peer with the same object graph and quirks as the
//! real editor: stale proxies, index-keyed collections, rippling composition
//! inserts, and a source-duration rounding quirk that can be dialled in.
//!
//! Used by the test suite and by `--demo` mode of both binaries. Every call is
//! recorded so tests can assert on exact call sequences.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{ObjectRef, RemoteCall, RemoteError, Transport};
use crate::timecode;

/// Length given to inserted compositions and imported media, in frames.
const DEFAULT_COMPOSITION_FRAMES: i64 = 120;
const DEFAULT_IMPORT_FRAMES: i64 = 240;
const TIMELINE_START_FRAME: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub target_type: Option<String>,
    pub method: String,
    pub args: Vec<Value>,
}

/// A placed timeline item as seen by tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedItem {
    pub name: String,
    pub track: i64,
    pub start: i64,
    pub end: i64,
    pub composition: bool,
}

#[derive(Debug, Clone)]
struct ProjectNode {
    name: String,
    media_pool: u64,
    timelines: Vec<u64>,
    current_timeline: Option<u64>,
    rendering: bool,
    render_progress: u32,
    render_jobs: Vec<String>,
}

#[derive(Debug, Clone)]
struct TimelineNode {
    name: String,
    fps: f64,
    playhead: i64,
    items: Vec<u64>,
    markers: BTreeMap<i64, Value>,
}

#[derive(Debug, Clone)]
enum Node {
    Application,
    ProjectManager,
    Project(ProjectNode),
    MediaPool { root: u64 },
    Folder { name: String, clips: Vec<u64>, subfolders: Vec<u64> },
    Clip { name: String, frames: i64 },
    Timeline(TimelineNode),
    Item(PlacedItem),
}

impl Node {
    fn type_name(&self) -> &'static str {
        match self {
            Node::Application => "Resolve",
            Node::ProjectManager => "ProjectManager",
            Node::Project(_) => "Project",
            Node::MediaPool { .. } => "MediaPool",
            Node::Folder { .. } => "Folder",
            Node::Clip { .. } => "MediaPoolItem",
            Node::Timeline(_) => "Timeline",
            Node::Item(_) => "TimelineItem",
        }
    }
}

struct Entry {
    generation: u64,
    node: Node,
}

struct World {
    next_id: u64,
    nodes: HashMap<u64, Entry>,
    app: u64,
    pm: u64,
    projects: Vec<u64>,
    current_project: Option<u64>,
    connected: bool,
    reachable: bool,
    connect_count: usize,
    calls: Vec<RecordedCall>,
    failures: HashMap<String, usize>,
    timeouts: HashMap<String, usize>,
    drops: Vec<String>,
    duration_skew: i64,
    composition_frames: i64,
}

/// Shareable handle to one simulated editor instance.
#[derive(Clone)]
pub struct FakeResolve {
    world: Arc<Mutex<World>>,
}

impl Default for FakeResolve {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeResolve {
    /// A running editor with one open project ("Untitled Project") and an
    /// empty media library. Not connected until `connect` is called.
    pub fn new() -> Self {
        let mut world = World {
            next_id: 1,
            nodes: HashMap::new(),
            app: 0,
            pm: 0,
            projects: Vec::new(),
            current_project: None,
            connected: false,
            reachable: true,
            connect_count: 0,
            calls: Vec::new(),
            failures: HashMap::new(),
            timeouts: HashMap::new(),
            drops: Vec::new(),
            duration_skew: 0,
            composition_frames: DEFAULT_COMPOSITION_FRAMES,
        };
        world.app = world.insert(Node::Application);
        world.pm = world.insert(Node::ProjectManager);
        let project = world.new_project("Untitled Project");
        world.current_project = Some(project);
        Self {
            world: Arc::new(Mutex::new(world)),
        }
    }

    /// Demo instance with a handful of clips already in the media library.
    pub fn demo() -> Self {
        let peer = Self::new();
        for (bin, name, frames) in [
            (None, "A001_C001.mov", 480),
            (None, "A001_C002.mov", 360),
            (Some("Interviews"), "INT_01.mxf", 2_400),
            (Some("Interviews"), "INT_02.mxf", 1_800),
            (Some("Broll"), "DRONE_04.mp4", 600),
        ] {
            peer.add_clip(bin, name, frames);
        }
        peer
    }

    // ── Seeding ──────────────────────────────────────────────────

    /// Add a clip to the current project's media library, optionally inside a
    /// named bin directly under the root folder.
    pub fn add_clip(&self, bin: Option<&str>, name: &str, frames: i64) {
        let mut w = self.world.lock();
        let Some(project) = w.current_project else { return };
        let Some(root) = w.root_folder(project) else { return };
        let folder = match bin {
            None => root,
            Some(bin) => w.find_or_create_subfolder(root, bin),
        };
        let clip = w.insert(Node::Clip {
            name: name.to_string(),
            frames,
        });
        if let Some(Node::Folder { clips, .. }) = w.node_mut(folder) {
            clips.push(clip);
        }
    }

    // ── Fault injection ──────────────────────────────────────────

    /// Invalidate every live proxy of the given remote type name
    /// (`"Project"`, `"MediaPool"`, `"Timeline"`, ..). The objects still exist;
    /// only previously handed-out references die.
    pub fn invalidate(&self, type_name: &str) {
        let mut w = self.world.lock();
        for entry in w.nodes.values_mut() {
            if entry.node.type_name() == type_name {
                entry.generation += 1;
            }
        }
    }

    /// Make the next `count` calls of `method` raise.
    pub fn fail_next(&self, method: &str, count: usize) {
        self.world.lock().failures.insert(method.to_string(), count);
    }

    /// Run the next `count` calls of `method`, then lose their replies as a
    /// timeout.
    pub fn time_out_after(&self, method: &str, count: usize) {
        self.world.lock().timeouts.insert(method.to_string(), count);
    }

    /// Tear down the connection the next time `method` is called. That call
    /// does not run.
    pub fn drop_connection_on(&self, method: &str) {
        self.world.lock().drops.push(method.to_string());
    }

    /// Tear down the connection. Calls fail until the next successful `connect`.
    pub fn disconnect(&self) {
        self.world.lock().connected = false;
    }

    /// When false, handshakes fail (editor not running).
    pub fn set_reachable(&self, reachable: bool) {
        self.world.lock().reachable = reachable;
    }

    /// Frames added to every on-timeline duration reported by `GetDuration`.
    pub fn set_duration_skew(&self, frames: i64) {
        self.world.lock().duration_skew = frames;
    }

    /// Switch the current project as a user would from the UI, without
    /// invalidating any proxy.
    pub fn switch_project(&self, name: &str) {
        let mut w = self.world.lock();
        let existing = w.project_by_name(name);
        let project = existing.unwrap_or_else(|| w.new_project(name));
        w.current_project = Some(project);
    }

    /// Close the current timeline in the current project.
    pub fn close_timeline(&self) {
        let mut w = self.world.lock();
        if let Some(project) = w.current_project {
            if let Some(Node::Project(p)) = w.node_mut(project) {
                p.current_timeline = None;
            }
        }
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.world.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.world.lock().calls.clear();
    }

    /// Number of recorded calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        self.world
            .lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn connect_count(&self) -> usize {
        self.world.lock().connect_count
    }

    pub fn timeline_names(&self) -> Vec<String> {
        let w = self.world.lock();
        let Some(Node::Project(p)) = w.current_project.and_then(|id| w.node(id)) else {
            return Vec::new();
        };
        p.timelines
            .iter()
            .filter_map(|id| match w.node(*id) {
                Some(Node::Timeline(t)) => Some(t.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Items of the named timeline in the current project, ordered by start.
    pub fn timeline_items(&self, timeline: &str) -> Vec<PlacedItem> {
        let w = self.world.lock();
        let Some(tl) = w.timeline_by_name(timeline) else {
            return Vec::new();
        };
        let Some(Node::Timeline(t)) = w.node(tl) else {
            return Vec::new();
        };
        let mut items: Vec<PlacedItem> = t
            .items
            .iter()
            .filter_map(|id| match w.node(*id) {
                Some(Node::Item(item)) => Some(item.clone()),
                _ => None,
            })
            .collect();
        items.sort_by_key(|i| (i.track, i.start));
        items
    }

    pub fn current_project_name(&self) -> Option<String> {
        let w = self.world.lock();
        match w.current_project.and_then(|id| w.node(id)) {
            Some(Node::Project(p)) => Some(p.name.clone()),
            _ => None,
        }
    }
}

impl Transport for FakeResolve {
    fn connect(&self) -> Result<(), RemoteError> {
        let mut w = self.world.lock();
        if !w.reachable {
            return Err(RemoteError::ConnectionLost(
                "editor is not running".to_string(),
            ));
        }
        w.connected = true;
        w.connect_count += 1;
        Ok(())
    }

    fn call(&self, call: &RemoteCall) -> Result<Value, RemoteError> {
        let mut w = self.world.lock();
        w.calls.push(RecordedCall {
            target_type: call.target.as_ref().map(|t| t.type_name.clone()),
            method: call.method.clone(),
            args: call.args.clone(),
        });
        if let Some(pos) = w.drops.iter().position(|m| *m == call.method) {
            w.drops.remove(pos);
            w.connected = false;
        }
        if !w.connected {
            return Err(RemoteError::ConnectionLost("socket closed".to_string()));
        }
        if let Some(remaining) = w.failures.get_mut(&call.method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Call {
                    method: call.method.clone(),
                    message: "injected failure".to_string(),
                });
            }
        }
        let reply = match &call.target {
            None => w.root(&call.method, &call.args),
            Some(target) => {
                let id = w.resolve(target).ok_or_else(|| RemoteError::StaleObject {
                    method: call.method.clone(),
                })?;
                w.dispatch(id, &call.method, &call.args)
            }
        };
        if let Some(remaining) = w.timeouts.get_mut(&call.method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Timeout { timeout_ms: 30_000 });
            }
        }
        reply
    }

    fn describe(&self) -> String {
        "in-memory demo peer".to_string()
    }
}

// ── Argument helpers ─────────────────────────────────────────────

fn bad_args(method: &str) -> RemoteError {
    RemoteError::Call {
        method: method.to_string(),
        message: "invalid arguments".to_string(),
    }
}

fn arg_str<'a>(args: &'a [Value], i: usize, method: &str) -> Result<&'a str, RemoteError> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| bad_args(method))
}

fn arg_i64(args: &[Value], i: usize, method: &str) -> Result<i64, RemoteError> {
    args.get(i)
        .and_then(super::value::as_i64)
        .ok_or_else(|| bad_args(method))
}

fn no_method(type_name: &str, method: &str) -> RemoteError {
    RemoteError::Call {
        method: method.to_string(),
        message: format!("'{type_name}' object has no attribute '{method}'"),
    }
}

// ── Simulation ───────────────────────────────────────────────────

impl World {
    fn insert(&mut self, node: Node) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, Entry { generation: 0, node });
        id
    }

    fn node(&self, id: u64) -> Option<&Node> {
        self.nodes.get(&id).map(|e| &e.node)
    }

    fn node_mut(&mut self, id: u64) -> Option<&mut Node> {
        self.nodes.get_mut(&id).map(|e| &mut e.node)
    }

    fn reference(&self, id: u64) -> Value {
        match self.nodes.get(&id) {
            Some(e) => ObjectRef::new(format!("{id}:{}", e.generation), e.node.type_name()).to_value(),
            None => Value::Null,
        }
    }

    fn opt_reference(&self, id: Option<u64>) -> Value {
        id.map_or(Value::Null, |id| self.reference(id))
    }

    /// Map a handed-out reference back to a node, rejecting stale generations.
    fn resolve(&self, r: &ObjectRef) -> Option<u64> {
        let (id, generation) = r.id.split_once(':')?;
        let id: u64 = id.parse().ok()?;
        let generation: u64 = generation.parse().ok()?;
        let entry = self.nodes.get(&id)?;
        (entry.generation == generation).then_some(id)
    }

    fn resolve_arg(&self, v: &Value) -> Option<u64> {
        super::value::object(v).and_then(|r| self.resolve(&r))
    }

    fn new_project(&mut self, name: &str) -> u64 {
        let root = self.insert(Node::Folder {
            name: "Master".to_string(),
            clips: Vec::new(),
            subfolders: Vec::new(),
        });
        let media_pool = self.insert(Node::MediaPool { root });
        let project = self.insert(Node::Project(ProjectNode {
            name: name.to_string(),
            media_pool,
            timelines: Vec::new(),
            current_timeline: None,
            rendering: false,
            render_progress: 0,
            render_jobs: Vec::new(),
        }));
        self.projects.push(project);
        project
    }

    fn project_by_name(&self, name: &str) -> Option<u64> {
        self.projects
            .iter()
            .copied()
            .find(|id| matches!(self.node(*id), Some(Node::Project(p)) if p.name == name))
    }

    fn root_folder(&self, project: u64) -> Option<u64> {
        let Some(Node::Project(p)) = self.node(project) else { return None };
        match self.node(p.media_pool) {
            Some(Node::MediaPool { root }) => Some(*root),
            _ => None,
        }
    }

    fn find_or_create_subfolder(&mut self, parent: u64, name: &str) -> u64 {
        let subs = match self.node(parent) {
            Some(Node::Folder { subfolders, .. }) => subfolders.clone(),
            _ => Vec::new(),
        };
        for sub in subs {
            if matches!(self.node(sub), Some(Node::Folder { name: n, .. }) if n == name) {
                return sub;
            }
        }
        let sub = self.insert(Node::Folder {
            name: name.to_string(),
            clips: Vec::new(),
            subfolders: Vec::new(),
        });
        if let Some(Node::Folder { subfolders, .. }) = self.node_mut(parent) {
            subfolders.push(sub);
        }
        sub
    }

    fn timeline_by_name(&self, name: &str) -> Option<u64> {
        let Some(Node::Project(p)) = self.current_project.and_then(|id| self.node(id)) else {
            return None;
        };
        p.timelines
            .iter()
            .copied()
            .find(|id| matches!(self.node(*id), Some(Node::Timeline(t)) if t.name == name))
    }

    fn project_of_media_pool(&self, media_pool: u64) -> Option<u64> {
        self.projects
            .iter()
            .copied()
            .find(|id| matches!(self.node(*id), Some(Node::Project(p)) if p.media_pool == media_pool))
    }

    fn root(&mut self, method: &str, args: &[Value]) -> Result<Value, RemoteError> {
        match method {
            "scriptapp" => {
                if arg_str(args, 0, method)? == "Resolve" {
                    Ok(self.reference(self.app))
                } else {
                    Ok(Value::Null)
                }
            }
            _ => Err(no_method("module", method)),
        }
    }

    fn dispatch(&mut self, id: u64, method: &str, args: &[Value]) -> Result<Value, RemoteError> {
        let Some(node) = self.node(id).cloned() else {
            return Err(RemoteError::StaleObject {
                method: method.to_string(),
            });
        };
        match node {
            Node::Application => self.application(method, args),
            Node::ProjectManager => self.project_manager(method, args),
            Node::Project(p) => self.project(id, &p, method, args),
            Node::MediaPool { root } => self.media_pool(id, root, method, args),
            Node::Folder {
                name,
                clips,
                subfolders,
            } => self.folder(&name, &clips, &subfolders, method),
            Node::Clip { name, frames } => Self::clip(id, &name, frames, method, args),
            Node::Timeline(t) => self.timeline(id, &t, method, args),
            Node::Item(item) => self.item(id, &item, method),
        }
    }

    fn application(&mut self, method: &str, args: &[Value]) -> Result<Value, RemoteError> {
        match method {
            "GetProductName" => Ok(json!("DaVinci Resolve")),
            "GetVersionString" => Ok(json!("19.1.0")),
            "GetProjectManager" => Ok(self.reference(self.pm)),
            "GetCurrentPage" => Ok(json!("edit")),
            "OpenPage" => Ok(json!(!arg_str(args, 0, method)?.is_empty())),
            _ => Err(no_method("Resolve", method)),
        }
    }

    fn project_manager(&mut self, method: &str, args: &[Value]) -> Result<Value, RemoteError> {
        match method {
            "GetCurrentProject" => Ok(self.opt_reference(self.current_project)),
            "CreateProject" => {
                let name = arg_str(args, 0, method)?;
                if name.is_empty() || self.project_by_name(name).is_some() {
                    return Ok(Value::Null);
                }
                let project = self.new_project(name);
                self.current_project = Some(project);
                Ok(self.reference(project))
            }
            "LoadProject" => {
                let name = arg_str(args, 0, method)?;
                match self.project_by_name(name) {
                    Some(project) => {
                        self.current_project = Some(project);
                        Ok(self.reference(project))
                    }
                    None => Ok(Value::Null),
                }
            }
            "SaveProject" => Ok(json!(self.current_project.is_some())),
            "GetProjectListInCurrentFolder" => Ok(Value::Array(
                self.projects
                    .iter()
                    .filter_map(|id| match self.node(*id) {
                        Some(Node::Project(p)) => Some(json!(p.name)),
                        _ => None,
                    })
                    .collect(),
            )),
            _ => Err(no_method("ProjectManager", method)),
        }
    }

    fn project(
        &mut self,
        id: u64,
        p: &ProjectNode,
        method: &str,
        args: &[Value],
    ) -> Result<Value, RemoteError> {
        match method {
            "GetName" => Ok(json!(p.name)),
            "GetMediaPool" => Ok(self.reference(p.media_pool)),
            "GetCurrentTimeline" => Ok(self.opt_reference(p.current_timeline)),
            "GetTimelineCount" => Ok(json!(p.timelines.len())),
            "GetTimelineByIndex" => {
                let index = arg_i64(args, 0, method)?;
                let tl = usize::try_from(index - 1)
                    .ok()
                    .and_then(|i| p.timelines.get(i).copied());
                Ok(self.opt_reference(tl))
            }
            "SetCurrentTimeline" => {
                let Some(tl) = args.first().and_then(|v| self.resolve_arg(v)) else {
                    return Ok(json!(false));
                };
                if !p.timelines.contains(&tl) {
                    return Ok(json!(false));
                }
                if let Some(Node::Project(p)) = self.node_mut(id) {
                    p.current_timeline = Some(tl);
                }
                Ok(json!(true))
            }
            "GetSetting" => match args.first().and_then(Value::as_str) {
                Some("timelineFrameRate") => Ok(json!("24")),
                Some(_) => Ok(json!("")),
                None => Ok(json!({ "timelineFrameRate": "24" })),
            },
            "LoadRenderPreset" | "SetRenderSettings" => Ok(json!(true)),
            "AddRenderJob" => {
                let job = format!("job-{}", p.render_jobs.len() + 1);
                if let Some(Node::Project(p)) = self.node_mut(id) {
                    p.render_jobs.push(job.clone());
                }
                Ok(json!(job))
            }
            "StartRendering" => {
                if p.current_timeline.is_none() || p.rendering {
                    return Ok(json!(false));
                }
                if let Some(Node::Project(p)) = self.node_mut(id) {
                    p.rendering = true;
                    p.render_progress = 0;
                }
                Ok(json!(true))
            }
            "IsRenderingInProgress" => {
                let mut in_progress = p.rendering;
                if let Some(Node::Project(p)) = self.node_mut(id) {
                    if p.rendering {
                        p.render_progress = (p.render_progress + 50).min(100);
                        if p.render_progress >= 100 {
                            p.rendering = false;
                        }
                    }
                    in_progress = p.rendering;
                }
                Ok(json!(in_progress))
            }
            "GetRenderingProgress" => Ok(json!(p.render_progress)),
            _ => Err(no_method("Project", method)),
        }
    }

    fn media_pool(
        &mut self,
        id: u64,
        root: u64,
        method: &str,
        args: &[Value],
    ) -> Result<Value, RemoteError> {
        let project = self
            .project_of_media_pool(id)
            .ok_or_else(|| RemoteError::StaleObject {
                method: method.to_string(),
            })?;
        match method {
            "GetRootFolder" => Ok(self.reference(root)),
            "CreateEmptyTimeline" => {
                let name = arg_str(args, 0, method)?.to_string();
                if name.is_empty() || self.timeline_by_name_in(project, &name).is_some() {
                    return Ok(Value::Null);
                }
                let tl = self.insert(Node::Timeline(TimelineNode {
                    name,
                    fps: 24.0,
                    playhead: TIMELINE_START_FRAME,
                    items: Vec::new(),
                    markers: BTreeMap::new(),
                }));
                if let Some(Node::Project(p)) = self.node_mut(project) {
                    p.timelines.push(tl);
                    p.current_timeline = Some(tl);
                }
                Ok(self.reference(tl))
            }
            "DeleteTimelines" => {
                let doomed: Vec<u64> = super::value::items(args.first().cloned().unwrap_or_default())
                    .iter()
                    .filter_map(|v| self.resolve_arg(v))
                    .collect();
                if doomed.is_empty() {
                    return Ok(json!(false));
                }
                if let Some(Node::Project(p)) = self.node_mut(project) {
                    p.timelines.retain(|t| !doomed.contains(t));
                    if p.current_timeline.is_some_and(|t| doomed.contains(&t)) {
                        p.current_timeline = None;
                    }
                }
                for tl in &doomed {
                    self.nodes.remove(tl);
                }
                Ok(json!(true))
            }
            "ImportMedia" => {
                let paths = super::value::items(args.first().cloned().unwrap_or_default());
                let mut imported = Vec::new();
                for path in paths.iter().filter_map(Value::as_str) {
                    let name = std::path::Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    if name.is_empty() {
                        continue;
                    }
                    let clip = self.insert(Node::Clip {
                        name,
                        frames: DEFAULT_IMPORT_FRAMES,
                    });
                    if let Some(Node::Folder { clips, .. }) = self.node_mut(root) {
                        clips.push(clip);
                    }
                    imported.push(self.reference(clip));
                }
                Ok(Value::Array(imported))
            }
            "AppendToTimeline" => self.append_to_timeline(project, args),
            _ => Err(no_method("MediaPool", method)),
        }
    }

    fn timeline_by_name_in(&self, project: u64, name: &str) -> Option<u64> {
        let Some(Node::Project(p)) = self.node(project) else { return None };
        p.timelines
            .iter()
            .copied()
            .find(|id| matches!(self.node(*id), Some(Node::Timeline(t)) if t.name == name))
    }

    /// Direct placement: items land at their record frame and nothing else moves.
    fn append_to_timeline(&mut self, project: u64, args: &[Value]) -> Result<Value, RemoteError> {
        let method = "AppendToTimeline";
        let Some(Node::Project(p)) = self.node(project) else {
            return Err(bad_args(method));
        };
        let Some(tl) = p.current_timeline else {
            return Ok(json!([]));
        };
        let infos = super::value::items(args.first().cloned().unwrap_or_default());
        let mut placed = Vec::new();
        for info in infos {
            let (clip_ref, record, start, end, track) = if info.get("$ref").is_some() {
                (info.clone(), None, None, None, 1)
            } else {
                (
                    info.get("mediaPoolItem").cloned().unwrap_or_default(),
                    info.get("recordFrame").and_then(super::value::as_i64),
                    info.get("startFrame").and_then(super::value::as_i64),
                    info.get("endFrame").and_then(super::value::as_i64),
                    info.get("trackIndex").and_then(super::value::as_i64).unwrap_or(1),
                )
            };
            let Some(clip) = self.resolve_arg(&clip_ref) else {
                return Err(RemoteError::StaleObject {
                    method: method.to_string(),
                });
            };
            let Some(Node::Clip { name, frames }) = self.node(clip).cloned() else {
                return Err(bad_args(method));
            };
            let start = start.unwrap_or(0).max(0);
            let end = end.unwrap_or(frames).min(frames);
            if end <= start {
                continue;
            }
            let record = record.unwrap_or_else(|| self.track_end(tl, track));
            let item = self.insert(Node::Item(PlacedItem {
                name,
                track,
                start: record,
                end: record + (end - start),
                composition: false,
            }));
            if let Some(Node::Timeline(t)) = self.node_mut(tl) {
                t.items.push(item);
            }
            placed.push(self.reference(item));
        }
        Ok(Value::Array(placed))
    }

    fn track_end(&self, timeline: u64, track: i64) -> i64 {
        let Some(Node::Timeline(t)) = self.node(timeline) else {
            return TIMELINE_START_FRAME;
        };
        t.items
            .iter()
            .filter_map(|id| match self.node(*id) {
                Some(Node::Item(i)) if i.track == track => Some(i.end),
                _ => None,
            })
            .max()
            .unwrap_or(TIMELINE_START_FRAME)
    }

    fn folder(
        &self,
        name: &str,
        clips: &[u64],
        subfolders: &[u64],
        method: &str,
    ) -> Result<Value, RemoteError> {
        let indexed = |ids: &[u64]| {
            let map: serde_json::Map<String, Value> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| ((i + 1).to_string(), self.reference(*id)))
                .collect();
            Value::Object(map)
        };
        match method {
            "GetName" => Ok(json!(name)),
            // Keyed by 1-based index, as the real peer does.
            "GetClips" => Ok(indexed(clips)),
            "GetSubFolders" => Ok(indexed(subfolders)),
            "GetClipList" => Ok(Value::Array(clips.iter().map(|id| self.reference(*id)).collect())),
            "GetSubFolderList" => Ok(Value::Array(
                subfolders.iter().map(|id| self.reference(*id)).collect(),
            )),
            _ => Err(no_method("Folder", method)),
        }
    }

    fn clip(id: u64, name: &str, frames: i64, method: &str, args: &[Value]) -> Result<Value, RemoteError> {
        match method {
            "GetName" => Ok(json!(name)),
            "GetUniqueId" => Ok(json!(format!("clip-{id}"))),
            "GetClipProperty" => match args.first().and_then(Value::as_str) {
                Some("Clip Name" | "File Name") => Ok(json!(name)),
                Some("Frames") => Ok(json!(frames.to_string())),
                Some("Type") => Ok(json!("Video")),
                Some(_) => Ok(json!("")),
                None => Ok(json!({ "Clip Name": name, "Frames": frames.to_string(), "Type": "Video" })),
            },
            _ => Err(no_method("MediaPoolItem", method)),
        }
    }

    fn timeline(
        &mut self,
        id: u64,
        t: &TimelineNode,
        method: &str,
        args: &[Value],
    ) -> Result<Value, RemoteError> {
        match method {
            "GetName" => Ok(json!(t.name)),
            "GetUniqueId" => Ok(json!(format!("timeline-{id}"))),
            "GetSetting" => match args.first().and_then(Value::as_str) {
                Some("timelineFrameRate") => Ok(json!(format!("{}", t.fps))),
                _ => Ok(json!("")),
            },
            "GetStartFrame" => Ok(json!(TIMELINE_START_FRAME)),
            "GetEndFrame" => Ok(json!(self.track_end(id, 1))),
            "GetTrackCount" => Ok(json!(1)),
            "GetCurrentTimecode" => Ok(json!(timecode::frame_to_timecode(t.playhead, t.fps))),
            "SetCurrentTimecode" => {
                let tc = arg_str(args, 0, method)?;
                let Some(frame) = timecode::timecode_to_frame(tc, t.fps) else {
                    return Ok(json!(false));
                };
                if let Some(Node::Timeline(t)) = self.node_mut(id) {
                    t.playhead = frame;
                }
                Ok(json!(true))
            }
            "GetItemListInTrack" => {
                let track = arg_i64(args, 1, method)?;
                let mut items: Vec<(i64, u64)> = t
                    .items
                    .iter()
                    .filter_map(|i| match self.node(*i) {
                        Some(Node::Item(item)) if item.track == track => Some((item.start, *i)),
                        _ => None,
                    })
                    .collect();
                items.sort_unstable();
                Ok(Value::Array(items.iter().map(|(_, i)| self.reference(*i)).collect()))
            }
            "InsertFusionCompositionIntoTimeline" => {
                let at = t.playhead;
                let len = self.composition_frames;
                // Insert ripples: everything on the track at or after the playhead shifts.
                for item in &t.items {
                    if let Some(Node::Item(i)) = self.node_mut(*item) {
                        if i.track == 1 && i.start >= at {
                            i.start += len;
                            i.end += len;
                        }
                    }
                }
                let comp = self.insert(Node::Item(PlacedItem {
                    name: "Fusion Composition".to_string(),
                    track: 1,
                    start: at,
                    end: at + len,
                    composition: true,
                }));
                if let Some(Node::Timeline(t)) = self.node_mut(id) {
                    t.items.push(comp);
                }
                Ok(self.reference(comp))
            }
            "AddMarker" => {
                let frame = arg_i64(args, 0, method)?;
                if t.markers.contains_key(&frame) {
                    return Ok(json!(false));
                }
                let marker = json!({
                    "color": args.get(1).cloned().unwrap_or(json!("Blue")),
                    "name": args.get(2).cloned().unwrap_or(json!("")),
                    "note": args.get(3).cloned().unwrap_or(json!("")),
                    "duration": args.get(4).cloned().unwrap_or(json!(1)),
                });
                if let Some(Node::Timeline(t)) = self.node_mut(id) {
                    t.markers.insert(frame, marker);
                }
                Ok(json!(true))
            }
            "GetMarkers" => {
                let map: serde_json::Map<String, Value> = t
                    .markers
                    .iter()
                    .map(|(f, m)| (f.to_string(), m.clone()))
                    .collect();
                Ok(Value::Object(map))
            }
            _ => Err(no_method("Timeline", method)),
        }
    }

    fn item(&self, id: u64, item: &PlacedItem, method: &str) -> Result<Value, RemoteError> {
        match method {
            "GetName" => Ok(json!(item.name)),
            "GetUniqueId" => Ok(json!(format!("item-{id}"))),
            "GetStart" => Ok(json!(item.start)),
            "GetEnd" => Ok(json!(item.end)),
            "GetDuration" => Ok(json!(item.end - item.start + self.duration_skew)),
            "GetTrackTypeAndIndex" => Ok(json!(["video", item.track])),
            _ => Err(no_method("TimelineItem", method)),
        }
    }
}
