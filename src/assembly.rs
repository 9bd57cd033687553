//! Timeline assembly: turns a validated cut list into an ordered sequence of
//! placement calls.
//!
//! Two facts about the editor shape the ordering:
//! - Inserting a composition at the playhead ripples everything at or after
//!   the playhead. Compositions therefore go in first, onto an empty timeline.
//! - Placing a media item with an explicit record frame never moves other
//!   items, so ordinary clips can follow in any order. They go ascending by
//!   start anyway so the call log reads like the edit.
//!
//! Once the first ordinary clip is placed, further composition inserts are
//! refused with [`AssemblyError::RippleSafetyViolation`].

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cutlist::CutList;
use crate::remote::{value, ObjectRef};
use crate::session::{Session, SessionError, SessionKind};
use crate::timecode::FrameClock;

/// What to do when a timeline with the cut list's name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExistingTimeline {
    /// Refuse before touching anything.
    #[default]
    Fail,
    /// Delete the existing timeline and build a fresh one.
    Replace,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyOptions {
    /// Insert a composition for every placeholder row (`file: null`).
    #[serde(default)]
    pub insert_placeholder_composition: bool,
    #[serde(default)]
    pub on_existing: ExistingTimeline,
    /// Video track for ordinary clips. Defaults to the logic profile's policy.
    #[serde(default)]
    pub track_index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementError {
    #[error("no media item named \"{name}\" in the media library")]
    MediaNotFound { name: String },
    #[error("{count} media items are named \"{name}\"")]
    AmbiguousMedia { name: String, count: usize },
    #[error("row has no usable file name")]
    NoFileName,
    #[error("{method} was rejected by the editor")]
    Rejected { method: String },
    #[error("{message}")]
    Remote { message: String },
}

/// Outcome of one placement step: a failure confined to its row, or a lost
/// link that ends the run.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Row(PlacementError),
    #[error(transparent)]
    Link(SessionError),
}

impl From<PlacementError> for StepError {
    fn from(e: PlacementError) -> Self {
        StepError::Row(e)
    }
}

impl From<SessionError> for StepError {
    fn from(e: SessionError) -> Self {
        if e.is_link_loss() {
            StepError::Link(e)
        } else {
            StepError::Row(PlacementError::Remote {
                message: e.to_string(),
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("a timeline named \"{0}\" already exists")]
    TimelineExists(String),
    #[error("could not create timeline \"{0}\"")]
    TimelineCreation(String),
    #[error("could not replace existing timeline \"{0}\"")]
    TimelineDeletion(String),
    /// A composition insert was requested after clips were placed; it would
    /// ripple them off their record frames.
    #[error("refusing to insert a composition for {shot_id} after clips were placed")]
    RippleSafetyViolation { shot_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Placed {
        record_frame: i64,
        source_start: i64,
        source_end: i64,
        duration_frames: i64,
    },
    PlaceholderInserted {
        record_frame: i64,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: PlacementError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RowReport {
    /// Index in the cut list.
    pub row: usize,
    pub shot_id: String,
    /// Position in execution order; `None` for skipped rows.
    pub step: Option<usize>,
    pub outcome: RowOutcome,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct AssemblyReport {
    pub timeline_name: String,
    pub timeline_id: Option<String>,
    pub fps: f64,
    pub frame_offset: i64,
    /// One entry per cut-list row, in cut-list order.
    pub rows: Vec<RowReport>,
    /// Cut-list row indices in the order they were executed.
    pub execution_order: Vec<usize>,
    pub placed: usize,
    pub placeholders_inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl AssemblyReport {
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Timeline \"{}\": {} placed, {} placeholder(s) inserted",
            self.timeline_name, self.placed, self.placeholders_inserted
        );
        if self.skipped > 0 {
            s.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.failed > 0 {
            s.push_str(&format!(", {} failed", self.failed));
        }
        s.push('.');
        s
    }
}

/// Execution buckets, each stably sorted by `timeline_start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub inserts: Vec<usize>,
    pub placements: Vec<usize>,
    pub skipped: Vec<usize>,
}

pub fn plan(cut: &CutList, insert_placeholders: bool) -> Plan {
    let by_start = |rows: &mut Vec<usize>| {
        rows.sort_by(|&a, &b| {
            let start = |i: usize| cut.clips.get(i).map_or(0.0, |c| c.timeline_start);
            start(a).total_cmp(&start(b))
        });
    };
    let (mut placeholders, mut placements): (Vec<usize>, Vec<usize>) =
        (0..cut.clips.len()).partition(|&i| cut.clips.get(i).is_some_and(|c| c.is_placeholder()));
    by_start(&mut placeholders);
    by_start(&mut placements);
    if insert_placeholders {
        Plan {
            inserts: placeholders,
            placements,
            skipped: Vec::new(),
        }
    } else {
        Plan {
            inserts: Vec::new(),
            placements,
            skipped: placeholders,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inserting,
    Placing,
}

/// One-way latch from composition inserts to clip placement.
#[derive(Debug)]
struct PhaseGuard {
    phase: Phase,
}

impl PhaseGuard {
    fn new() -> Self {
        Self {
            phase: Phase::Inserting,
        }
    }

    fn check_insert(&self, shot_id: &str) -> Result<(), AssemblyError> {
        if self.phase == Phase::Placing {
            return Err(AssemblyError::RippleSafetyViolation {
                shot_id: shot_id.to_string(),
            });
        }
        Ok(())
    }

    fn start_placing(&mut self) {
        self.phase = Phase::Placing;
    }
}

/// Media library contents keyed by exact item name, extension included.
struct MediaIndex {
    by_name: HashMap<String, Vec<ObjectRef>>,
}

impl MediaIndex {
    fn build(session: &mut Session<'_>) -> Result<Self, SessionError> {
        let root = session.invoke(SessionKind::MediaLibrary, "GetRootFolder", vec![])?;
        let mut by_name: HashMap<String, Vec<ObjectRef>> = HashMap::new();
        let mut pending: Vec<ObjectRef> = value::object(&root).into_iter().collect();
        while let Some(folder) = pending.pop() {
            for clip in value::objects(session.call(&folder, "GetClips", vec![])?) {
                let name = session.call(&clip, "GetClipProperty", vec![json!("Clip Name")])?;
                if let Some(name) = value::as_string(&name) {
                    by_name.entry(name).or_default().push(clip);
                }
            }
            pending.extend(value::objects(session.call(&folder, "GetSubFolders", vec![])?));
        }
        tracing::debug!(names = by_name.len(), "media index built");
        Ok(Self { by_name })
    }

    fn lookup(&self, name: &str) -> Result<&ObjectRef, PlacementError> {
        match self.by_name.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(PlacementError::MediaNotFound {
                name: name.to_string(),
            }),
            Some([only]) => Ok(only),
            Some(many) => Err(PlacementError::AmbiguousMedia {
                name: name.to_string(),
                count: many.len(),
            }),
        }
    }
}

/// Find a timeline in the current project by exact name.
pub fn find_timeline(
    session: &mut Session<'_>,
    name: &str,
) -> Result<Option<ObjectRef>, SessionError> {
    let count = session.invoke(SessionKind::Project, "GetTimelineCount", vec![])?;
    let count = value::as_i64(&count).unwrap_or(0);
    for index in 1..=count {
        let reply = session.invoke(SessionKind::Project, "GetTimelineByIndex", vec![json!(index)])?;
        let Some(timeline) = value::object(&reply) else { continue };
        let tl_name = session.call(&timeline, "GetName", vec![])?;
        if tl_name.as_str() == Some(name) {
            return Ok(Some(timeline));
        }
    }
    Ok(None)
}

/// Create an empty timeline, make it current and adopt it as the session's
/// timeline.
pub fn create_timeline(session: &mut Session<'_>, name: &str) -> Result<ObjectRef, AssemblyError> {
    let created = session.invoke(
        SessionKind::MediaLibrary,
        "CreateEmptyTimeline",
        vec![json!(name)],
    )?;
    let timeline =
        value::object(&created).ok_or_else(|| AssemblyError::TimelineCreation(name.to_string()))?;
    let made_current = session.invoke(
        SessionKind::Project,
        "SetCurrentTimeline",
        vec![timeline.to_value()],
    )?;
    if !value::truthy(&made_current) {
        return Err(AssemblyError::TimelineCreation(name.to_string()));
    }
    session.adopt(SessionKind::Timeline, timeline.clone());
    Ok(timeline)
}

/// Build the cut list's timeline. The caller holds the session for the whole
/// run, so no other tool call can interleave.
pub fn assemble(
    session: &mut Session<'_>,
    cut: &CutList,
    options: &AssemblyOptions,
    clock: FrameClock,
) -> Result<AssemblyReport, AssemblyError> {
    let policy = session.profile().placement.clone();
    let track_index = options.track_index.unwrap_or(policy.track_index);
    let plan = plan(cut, options.insert_placeholder_composition);
    tracing::info!(
        timeline = %cut.name,
        inserts = plan.inserts.len(),
        placements = plan.placements.len(),
        skipped = plan.skipped.len(),
        "assembling timeline"
    );

    session.ensure(SessionKind::Project)?;
    if let Some(existing) = find_timeline(session, &cut.name)? {
        match options.on_existing {
            ExistingTimeline::Fail => return Err(AssemblyError::TimelineExists(cut.name.clone())),
            ExistingTimeline::Replace => {
                let deleted = session.invoke(
                    SessionKind::MediaLibrary,
                    "DeleteTimelines",
                    vec![json!([existing.to_value()])],
                )?;
                if !value::truthy(&deleted) {
                    return Err(AssemblyError::TimelineDeletion(cut.name.clone()));
                }
                session.forget(SessionKind::Timeline);
                tracing::info!(timeline = %cut.name, "replaced existing timeline");
            }
        }
    }

    let timeline = create_timeline(session, &cut.name)?;
    let timeline_id = session
        .call(&timeline, "GetUniqueId", vec![])
        .ok()
        .and_then(|v| value::as_string(&v));

    let mut rows: Vec<Option<RowReport>> = vec![None; cut.clips.len()];
    let mut execution_order = Vec::with_capacity(plan.inserts.len() + plan.placements.len());
    let mut guard = PhaseGuard::new();

    let row_warnings = |row: usize| -> Vec<String> {
        cut.warnings
            .iter()
            .filter(|w| w.row == row)
            .map(|w| w.message.clone())
            .collect()
    };

    for &row in &plan.inserts {
        let Some(clip) = cut.clips.get(row) else { continue };
        guard.check_insert(&clip.shot_id)?;
        let record_frame = clock.record_frame(clip.timeline_start);
        let outcome = match insert_composition(session, clock, record_frame) {
            Ok(()) => RowOutcome::PlaceholderInserted { record_frame },
            Err(StepError::Row(error)) => RowOutcome::Failed { error },
            Err(StepError::Link(e)) => return Err(e.into()),
        };
        tracing::debug!(shot = %clip.shot_id, record_frame, ?outcome, "placeholder");
        if let Some(slot) = rows.get_mut(row) {
            *slot = Some(RowReport {
                row,
                shot_id: clip.shot_id.clone(),
                step: Some(execution_order.len()),
                outcome,
                warnings: row_warnings(row),
            });
        }
        execution_order.push(row);
    }

    guard.start_placing();
    let index = if plan.placements.is_empty() {
        None
    } else {
        match MediaIndex::build(session) {
            Ok(index) => Some(Ok(index)),
            Err(e) if e.is_link_loss() => return Err(e.into()),
            Err(e) => Some(Err(PlacementError::Remote {
                message: e.to_string(),
            })),
        }
    };

    for &row in &plan.placements {
        let Some(clip) = cut.clips.get(row) else { continue };
        let mut warnings = row_warnings(row);
        let record_frame = clock.record_frame(clip.timeline_start);
        let source_start = clock.source_frame(clip.clip_in);
        let duration_frames = clock.frames(clip.duration());
        let source_end = source_start + duration_frames;

        let media = match &index {
            Some(Ok(index)) => clip
                .basename()
                .ok_or(PlacementError::NoFileName)
                .and_then(|name| index.lookup(name)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(PlacementError::Remote {
                message: "media library unavailable".to_string(),
            }),
        };
        let placed = media.map_err(StepError::Row).and_then(|media| {
            let info = json!({
                "mediaPoolItem": media.to_value(),
                "trackIndex": track_index,
                "recordFrame": record_frame,
                "startFrame": source_start,
                "endFrame": source_end,
                "mediaType": 1,
            });
            place(session, &info)
        });

        let outcome = match placed {
            Ok(item) => {
                if policy.verify_duration {
                    if let Some(w) = verify_duration(session, &item, duration_frames)? {
                        warnings.push(w);
                    }
                }
                RowOutcome::Placed {
                    record_frame,
                    source_start,
                    source_end,
                    duration_frames,
                }
            }
            Err(StepError::Row(error)) => {
                tracing::warn!(shot = %clip.shot_id, %error, "placement failed");
                RowOutcome::Failed { error }
            }
            Err(StepError::Link(e)) => {
                tracing::warn!(shot = %clip.shot_id, error = %e, "link lost, aborting assembly");
                return Err(e.into());
            }
        };
        if let Some(slot) = rows.get_mut(row) {
            *slot = Some(RowReport {
                row,
                shot_id: clip.shot_id.clone(),
                step: Some(execution_order.len()),
                outcome,
                warnings,
            });
        }
        execution_order.push(row);
    }

    for &row in &plan.skipped {
        let Some(clip) = cut.clips.get(row) else { continue };
        if let Some(slot) = rows.get_mut(row) {
            *slot = Some(RowReport {
                row,
                shot_id: clip.shot_id.clone(),
                step: None,
                outcome: RowOutcome::Skipped {
                    reason: "placeholder (composition insertion disabled)".to_string(),
                },
                warnings: row_warnings(row),
            });
        }
    }

    let rows: Vec<RowReport> = rows.into_iter().flatten().collect();
    let count = |f: fn(&RowOutcome) -> bool| rows.iter().filter(|r| f(&r.outcome)).count();
    let report = AssemblyReport {
        timeline_name: cut.name.clone(),
        timeline_id,
        fps: clock.fps,
        frame_offset: clock.offset,
        placed: count(|o| matches!(o, RowOutcome::Placed { .. })),
        placeholders_inserted: count(|o| matches!(o, RowOutcome::PlaceholderInserted { .. })),
        skipped: count(|o| matches!(o, RowOutcome::Skipped { .. })),
        failed: count(|o| matches!(o, RowOutcome::Failed { .. })),
        rows,
        execution_order,
    };
    tracing::info!("{}", report.summary());
    Ok(report)
}

/// Move the playhead to `record_frame` and insert a composition there.
pub fn insert_composition(
    session: &mut Session<'_>,
    clock: FrameClock,
    record_frame: i64,
) -> Result<(), StepError> {
    let tc = clock.timecode(record_frame);
    let moved = session.invoke(SessionKind::Timeline, "SetCurrentTimecode", vec![json!(tc)])?;
    if !value::truthy(&moved) {
        return Err(PlacementError::Rejected {
            method: "SetCurrentTimecode".to_string(),
        }
        .into());
    }
    let inserted = session.invoke(
        SessionKind::Timeline,
        "InsertFusionCompositionIntoTimeline",
        vec![],
    )?;
    if value::object(&inserted).is_none() {
        return Err(PlacementError::Rejected {
            method: "InsertFusionCompositionIntoTimeline".to_string(),
        }
        .into());
    }
    Ok(())
}

fn place(session: &mut Session<'_>, info: &Value) -> Result<ObjectRef, StepError> {
    let reply = session.invoke(
        SessionKind::MediaLibrary,
        "AppendToTimeline",
        vec![json!([info])],
    )?;
    value::objects(reply).into_iter().next().ok_or_else(|| {
        PlacementError::Rejected {
            method: "AppendToTimeline".to_string(),
        }
        .into()
    })
}

/// Warning text when the placed duration differs from `expected`.
fn verify_duration(
    session: &mut Session<'_>,
    item: &ObjectRef,
    expected: i64,
) -> Result<Option<String>, SessionError> {
    Ok(match session.call(item, "GetDuration", vec![]) {
        Ok(v) => match value::as_i64(&v) {
            Some(actual) if actual == expected => None,
            Some(actual) => Some(format!(
                "placed duration is {actual} frames, expected {expected}"
            )),
            None => Some("placed duration could not be read".to_string()),
        },
        Err(e) if e.is_link_loss() => return Err(e),
        Err(e) => Some(format!("placed duration could not be verified: {e}")),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cutlist;
    use crate::logic::LogicProfile;
    use crate::remote::fake::FakeResolve;
    use crate::remote::Link;
    use crate::session::SessionProxyManager;

    fn manager(peer: &FakeResolve) -> SessionProxyManager {
        let link = Link::open(Box::new(peer.clone())).unwrap();
        SessionProxyManager::new(link, Arc::new(LogicProfile::default()))
    }

    fn row(shot: &str, file: Option<&str>, start: f64, len: f64) -> Value {
        json!({
            "shot_id": shot, "file": file,
            "timeline_start": start, "timeline_end": start + len,
            "clip_in": 0.0, "clip_out": len,
        })
    }

    fn cut(name: &str, rows: Vec<Value>) -> CutList {
        cutlist::from_value(json!({ "name": name, "clips": rows }), cutlist::DEFAULT_SPAN_EPSILON)
            .unwrap()
    }

    fn run(peer: &FakeResolve, cut: &CutList, options: &AssemblyOptions) -> Result<AssemblyReport, AssemblyError> {
        manager(peer).with_session(|s| assemble(s, cut, options, FrameClock::default()))
    }

    fn with_placeholders() -> AssemblyOptions {
        AssemblyOptions {
            insert_placeholder_composition: true,
            ..AssemblyOptions::default()
        }
    }

    #[test]
    fn scenario_placeholder_then_clip_without_ripple() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "b.mp4", 1_000);
        let cut = cutlist::parse(
            &json!({"name": "T", "clips": [
                {"shot_id": "A", "file": null, "timeline_start": 0, "timeline_end": 7, "clip_in": 0, "clip_out": 7},
                {"shot_id": "B", "file": "b.mp4", "timeline_start": 7, "timeline_end": 13.381, "clip_in": 0, "clip_out": 6.381}
            ]})
            .to_string(),
        )
        .unwrap();

        let report = run(&peer, &cut, &with_placeholders()).unwrap();
        assert_eq!(report.rows[0].outcome, RowOutcome::PlaceholderInserted { record_frame: 86_400 });
        assert_eq!(
            report.rows[1].outcome,
            RowOutcome::Placed {
                record_frame: 86_568,
                source_start: 0,
                source_end: 153,
                duration_frames: 153
            }
        );
        assert_eq!(report.execution_order, vec![0, 1]);

        let tc_calls: Vec<Value> = peer
            .calls()
            .into_iter()
            .filter(|c| c.method == "SetCurrentTimecode")
            .map(|c| c.args[0].clone())
            .collect();
        assert_eq!(tc_calls, vec![json!("01:00:00:00")]);

        let items = peer.timeline_items("T");
        let b = items.iter().find(|i| i.name == "b.mp4").unwrap();
        assert_eq!((b.start, b.end), (86_568, 86_568 + 153));
        let comp = items.iter().find(|i| i.composition).unwrap();
        assert_eq!(comp.start, 86_400);
    }

    #[test]
    fn placeholders_run_first_and_each_bucket_ascends() {
        let peer = FakeResolve::new();
        for name in ["o1.mov", "o2.mov", "o3.mov"] {
            peer.add_clip(None, name, 10_000);
        }
        let cut = cut(
            "Order",
            vec![
                row("O1", Some("o1.mov"), 10.0, 2.0),
                row("P1", None, 5.0, 1.0),
                row("O2", Some("o2.mov"), 2.0, 1.0),
                row("P2", None, 0.0, 1.0),
                row("O3", Some("o3.mov"), 2.0, 1.0),
            ],
        );
        let report = run(&peer, &cut, &with_placeholders()).unwrap();
        // P2, P1 by start; then O2 and O3 (tie, stable), then O1.
        assert_eq!(report.execution_order, vec![3, 1, 2, 4, 0]);
        assert_eq!(report.rows.iter().map(|r| r.row).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(report.rows[3].step, Some(0));

        let calls = peer.calls();
        let last_insert = calls
            .iter()
            .rposition(|c| c.method == "InsertFusionCompositionIntoTimeline")
            .unwrap();
        let first_append = calls.iter().position(|c| c.method == "AppendToTimeline").unwrap();
        assert!(last_insert < first_append);

        let records: Vec<i64> = calls
            .iter()
            .filter(|c| c.method == "AppendToTimeline")
            .map(|c| c.args[0][0]["recordFrame"].as_i64().unwrap())
            .collect();
        assert_eq!(records, vec![86_448, 86_448, 86_640]);
        let timecodes: Vec<&str> = calls
            .iter()
            .filter(|c| c.method == "SetCurrentTimecode")
            .map(|c| c.args[0].as_str().unwrap())
            .collect();
        assert_eq!(timecodes, vec!["01:00:00:00", "01:00:05:00"]);
    }

    #[test]
    fn flag_is_irrelevant_without_placeholders() {
        let cut = cut(
            "Same",
            vec![row("A", Some("a.mov"), 0.0, 2.0), row("B", Some("b.mov"), 2.0, 3.0)],
        );
        let reports: Vec<String> = [false, true]
            .into_iter()
            .map(|flag| {
                let peer = FakeResolve::new();
                peer.add_clip(None, "a.mov", 500);
                peer.add_clip(None, "b.mov", 500);
                let options = AssemblyOptions {
                    insert_placeholder_composition: flag,
                    ..AssemblyOptions::default()
                };
                serde_json::to_string(&run(&peer, &cut, &options).unwrap()).unwrap()
            })
            .collect();
        assert_eq!(reports[0], reports[1]);
    }

    #[test]
    fn one_missing_file_fails_only_its_row() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        peer.add_clip(Some("Bin"), "c.mov", 500);
        let cut = cut(
            "Partial",
            vec![
                row("A", Some("media/a.mov"), 0.0, 1.0),
                row("B", Some("media/b.mov"), 1.0, 1.0),
                row("C", Some("media/c.mov"), 2.0, 1.0),
            ],
        );
        let report = run(&peer, &cut, &AssemblyOptions::default()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.placed, 2);
        assert_eq!(
            report.rows[1].outcome,
            RowOutcome::Failed {
                error: PlacementError::MediaNotFound { name: "b.mov".into() }
            }
        );
        assert_eq!(peer.timeline_items("Partial").len(), 2);
    }

    #[test]
    fn name_match_is_exact_including_extension() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a", 500);
        let cut = cut("Exact", vec![row("A", Some("a.mov"), 0.0, 1.0)]);
        let report = run(&peer, &cut, &AssemblyOptions::default()).unwrap();
        assert!(matches!(
            report.rows[0].outcome,
            RowOutcome::Failed { error: PlacementError::MediaNotFound { .. } }
        ));
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let peer = FakeResolve::new();
        peer.add_clip(Some("Day1"), "take.mov", 500);
        peer.add_clip(Some("Day2"), "take.mov", 500);
        let cut = cut("Dup", vec![row("A", Some("take.mov"), 0.0, 1.0)]);
        let report = run(&peer, &cut, &AssemblyOptions::default()).unwrap();
        assert_eq!(
            report.rows[0].outcome,
            RowOutcome::Failed {
                error: PlacementError::AmbiguousMedia { name: "take.mov".into(), count: 2 }
            }
        );
    }

    #[test]
    fn placeholders_are_skipped_when_insertion_is_off() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        let cut = cut("Skip", vec![row("P", None, 0.0, 1.0), row("A", Some("a.mov"), 1.0, 1.0)]);
        let report = run(&peer, &cut, &AssemblyOptions::default()).unwrap();
        assert!(matches!(report.rows[0].outcome, RowOutcome::Skipped { .. }));
        assert_eq!(report.rows[0].step, None);
        assert_eq!(report.execution_order, vec![1]);
        assert_eq!(peer.count("InsertFusionCompositionIntoTimeline"), 0);
    }

    #[test]
    fn existing_timeline_fails_unless_replace_is_requested() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        let mgr = manager(&peer);
        let cut = cut("Again", vec![row("A", Some("a.mov"), 0.0, 1.0)]);
        let clock = FrameClock::default();
        mgr.with_session(|s| assemble(s, &cut, &AssemblyOptions::default(), clock))
            .unwrap();

        let creates = peer.count("CreateEmptyTimeline");
        let err = mgr
            .with_session(|s| assemble(s, &cut, &AssemblyOptions::default(), clock))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::TimelineExists(ref n) if n == "Again"));
        assert_eq!(peer.count("CreateEmptyTimeline"), creates);

        let replace = AssemblyOptions {
            on_existing: ExistingTimeline::Replace,
            ..AssemblyOptions::default()
        };
        mgr.with_session(|s| assemble(s, &cut, &replace, clock)).unwrap();
        assert_eq!(peer.timeline_names(), vec!["Again".to_string()]);
        assert_eq!(peer.timeline_items("Again").len(), 1);
    }

    #[test]
    fn duration_mismatch_is_a_row_warning() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        peer.set_duration_skew(1);
        let cut = cut("Skew", vec![row("A", Some("a.mov"), 0.0, 2.0)]);
        let report = run(&peer, &cut, &AssemblyOptions::default()).unwrap();
        assert_eq!(report.placed, 1);
        assert_eq!(report.rows[0].warnings.len(), 1);
        assert!(report.rows[0].warnings[0].contains("49 frames, expected 48"));
    }

    #[test]
    fn span_warning_travels_into_report() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        let cut = cutlist::from_value(
            json!({"name": "Warn", "clips": [
                {"shot_id": "A", "file": "a.mov", "timeline_start": 0, "timeline_end": 9, "clip_in": 0, "clip_out": 2}
            ]}),
            cutlist::DEFAULT_SPAN_EPSILON,
        )
        .unwrap();
        let report = run(&peer, &cut, &AssemblyOptions::default()).unwrap();
        assert_eq!(report.rows[0].warnings.len(), 1);
        assert!(matches!(report.rows[0].outcome, RowOutcome::Placed { duration_frames: 48, .. }));
    }

    #[test]
    fn transient_append_failure_is_retried() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        peer.fail_next("AppendToTimeline", 1);
        let cut = cut("Retry", vec![row("A", Some("a.mov"), 0.0, 1.0)]);
        let report = run(&peer, &cut, &AssemblyOptions::default()).unwrap();
        assert_eq!(report.placed, 1);
        assert_eq!(peer.count("AppendToTimeline"), 2);
    }

    #[test]
    fn timed_out_append_places_the_clip_once() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        peer.add_clip(None, "b.mov", 500);
        peer.time_out_after("AppendToTimeline", 1);
        let cut = cut(
            "Timeout",
            vec![row("A", Some("a.mov"), 0.0, 1.0), row("B", Some("b.mov"), 1.0, 1.0)],
        );
        let err = run(&peer, &cut, &AssemblyOptions::default()).unwrap_err();
        assert!(matches!(err, AssemblyError::Session(ref e) if e.is_link_loss()));
        assert_eq!(peer.count("AppendToTimeline"), 1);
        assert_eq!(peer.timeline_items("Timeout").len(), 1);
        assert_eq!(peer.connect_count(), 1);
    }

    #[test]
    fn link_lost_before_placements_aborts_the_run() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        peer.drop_connection_on("GetClips");
        let cut = cut("Lost", vec![row("P", None, 0.0, 1.0), row("A", Some("a.mov"), 1.0, 1.0)]);
        let err = run(&peer, &cut, &with_placeholders()).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Session(SessionError::Disconnected {
                cause: crate::session::DisconnectCause::Transport,
                ..
            })
        ));
        assert_eq!(peer.count("InsertFusionCompositionIntoTimeline"), 1);
        assert_eq!(peer.count("AppendToTimeline"), 0);
    }

    #[test]
    fn no_composition_insert_follows_a_placement() {
        let peer = FakeResolve::new();
        peer.add_clip(None, "a.mov", 500);
        peer.add_clip(None, "b.mov", 500);
        let cut = cut(
            "Late",
            vec![
                row("A", Some("a.mov"), 0.0, 2.0),
                row("B", Some("b.mov"), 2.0, 2.0),
                row("P", None, 10.0, 1.0),
            ],
        );
        let report = run(&peer, &cut, &with_placeholders()).unwrap();
        assert_eq!(report.execution_order, vec![2, 0, 1]);
        let calls = peer.calls();
        let first_append = calls.iter().position(|c| c.method == "AppendToTimeline").unwrap();
        assert!(calls[first_append..]
            .iter()
            .all(|c| c.method != "InsertFusionCompositionIntoTimeline"));
        assert_eq!(peer.count("InsertFusionCompositionIntoTimeline"), 1);
    }

    #[test]
    fn insert_after_placing_is_refused() {
        let mut guard = PhaseGuard::new();
        guard.check_insert("A").unwrap();
        guard.start_placing();
        let err = guard.check_insert("B").unwrap_err();
        assert!(matches!(err, AssemblyError::RippleSafetyViolation { ref shot_id } if shot_id == "B"));
    }

    #[test]
    fn plan_buckets() {
        let cut = cut(
            "Plan",
            vec![row("A", Some("a"), 3.0, 1.0), row("P", None, 1.0, 1.0), row("B", Some("b"), 0.0, 1.0)],
        );
        let on = plan(&cut, true);
        assert_eq!((on.inserts, on.placements, on.skipped), (vec![1], vec![2, 0], vec![]));
        let off = plan(&cut, false);
        assert_eq!((off.inserts, off.placements, off.skipped), (vec![], vec![2, 0], vec![1]));
    }
}
