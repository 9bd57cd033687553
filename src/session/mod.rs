//! Session proxy manager.
//!
//! Owns the cached handle for each session kind and is the only place that
//! hands them out. Every caller goes through [`Session::ensure`], which probes
//! the cached handle and transparently re-derives it along the kind's accessor
//! chain when the remote runtime has invalidated it.
//!
//! Limitation: probing only detects handles the remote runtime itself killed.
//! A user switching projects in the UI leaves the old project handle alive and
//! probing fine. [`Session::refresh_all`] is the escape hatch for that case.

pub mod probe;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logic::LogicProfile;
use crate::remote::{value, Link, ObjectRef, RemoteError};

use probe::{probe, Liveness};

/// Remote objects whose handles are cached across calls.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum SessionKind {
    Application,
    ProjectManager,
    Project,
    MediaLibrary,
    Timeline,
}

impl SessionKind {
    /// Parents always come before their children.
    pub fn all() -> &'static [SessionKind] {
        &[
            Self::Application,
            Self::ProjectManager,
            Self::Project,
            Self::MediaLibrary,
            Self::Timeline,
        ]
    }

    pub fn parent(self) -> Option<SessionKind> {
        match self {
            Self::Application => None,
            Self::ProjectManager => Some(Self::Application),
            Self::Project => Some(Self::ProjectManager),
            Self::MediaLibrary | Self::Timeline => Some(Self::Project),
        }
    }

    /// True when `self` is derived (directly or transitively) from `ancestor`.
    pub fn descends_from(self, ancestor: SessionKind) -> bool {
        let mut cur = self.parent();
        while let Some(kind) = cur {
            if kind == ancestor {
                return true;
            }
            cur = kind.parent();
        }
        false
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Application => "Application",
            Self::ProjectManager => "ProjectManager",
            Self::Project => "Project",
            Self::MediaLibrary => "MediaLibrary",
            Self::Timeline => "Timeline",
        };
        f.write_str(name)
    }
}

/// A validated reference to the remote object currently backing a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    kind: SessionKind,
    object: ObjectRef,
}

impl Handle {
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisconnectCause {
    /// The transport or a remote call failed.
    Transport,
    /// The accessor answered, but there is no such object (e.g. no open timeline).
    NoSuchObject,
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport failure"),
            Self::NoSuchObject => f.write_str("no such object"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("{kind} unavailable ({cause}): {detail}")]
    Disconnected {
        kind: SessionKind,
        cause: DisconnectCause,
        detail: String,
    },
    /// A call kept failing even though its handle was valid.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SessionError {
    fn transport(kind: SessionKind, err: &RemoteError) -> Self {
        Self::Disconnected {
            kind,
            cause: DisconnectCause::Transport,
            detail: err.to_string(),
        }
    }

    /// A failed call on an object. Timeouts and connection loss end the
    /// in-flight call; anything else is the remote method's own failure.
    fn from_call(kind: SessionKind, err: RemoteError) -> Self {
        if err.is_link_fatal() {
            Self::transport(kind, &err)
        } else {
            Self::Remote(err)
        }
    }

    /// True when the scripting link itself failed, as opposed to a missing
    /// object or a failing remote method.
    pub fn is_link_loss(&self) -> bool {
        matches!(
            self,
            Self::Disconnected {
                cause: DisconnectCause::Transport,
                ..
            }
        )
    }

    fn missing(kind: SessionKind, detail: String) -> Self {
        Self::Disconnected {
            kind,
            cause: DisconnectCause::NoSuchObject,
            detail,
        }
    }
}

/// One handle slot per kind. Entries are replaced wholesale, never edited.
#[derive(Debug, Default)]
struct SessionState {
    handles: IndexMap<SessionKind, Handle>,
}

impl SessionState {
    fn get(&self, kind: SessionKind) -> Option<&Handle> {
        self.handles.get(&kind)
    }

    fn replace(&mut self, handle: Handle) {
        self.handles.insert(handle.kind, handle);
    }

    fn clear(&mut self, kind: SessionKind) {
        self.handles.shift_remove(&kind);
    }
}

/// Outcome of re-deriving every kind.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RefreshSummary {
    pub bound: Vec<SessionKind>,
    /// Kinds with no backing object right now (e.g. no open timeline).
    pub unbound: Vec<SessionKind>,
}

/// Shared owner of the session state. All access is serialized.
pub struct SessionProxyManager {
    link: Arc<Link>,
    profile: Arc<LogicProfile>,
    state: Mutex<SessionState>,
}

impl SessionProxyManager {
    pub fn new(link: Arc<Link>, profile: Arc<LogicProfile>) -> Self {
        Self {
            link,
            profile,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Run `f` with exclusive access to the session. A whole multi-step
    /// operation (e.g. an assembly run) holds this for its duration.
    pub fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session<'_>) -> R,
    {
        let mut guard = self.state.lock();
        let mut session = Session {
            link: &self.link,
            profile: &self.profile,
            state: &mut guard,
        };
        f(&mut session)
    }

    pub fn ensure(&self, kind: SessionKind) -> Result<Handle, SessionError> {
        self.with_session(|s| s.ensure(kind))
    }

    // A method path would pin `Session` to a single lifetime.
    #[allow(clippy::redundant_closure_for_method_calls)]
    pub fn refresh_all(&self) -> Result<RefreshSummary, SessionError> {
        self.with_session(|s| s.refresh_all())
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn profile(&self) -> &LogicProfile {
        &self.profile
    }
}

/// Borrowed view of the session while the state lock is held.
pub struct Session<'a> {
    link: &'a Link,
    profile: &'a LogicProfile,
    state: &'a mut SessionState,
}

impl Session<'_> {
    pub fn profile(&self) -> &LogicProfile {
        self.profile
    }

    /// Return a live handle for `kind`, re-acquiring it (and any dead
    /// ancestors) if needed. Never returns a handle that failed its probe.
    pub fn ensure(&mut self, kind: SessionKind) -> Result<Handle, SessionError> {
        self.revive()?;
        let recipe = self
            .profile
            .recipe(kind)
            .ok_or_else(|| SessionError::missing(kind, "no recipe in logic profile".into()))?;

        if let Some(handle) = self.state.get(kind).cloned() {
            if probe(self.link, &handle.object, &recipe.probe) == Liveness::Alive {
                return Ok(handle);
            }
            tracing::info!(%kind, "cached handle is stale, re-acquiring");
            self.state.clear(kind);
            if self.link.is_dead() {
                self.revive()?;
            }
        }

        let parent = match kind.parent() {
            Some(parent) => Some(self.ensure(parent)?.object),
            None => None,
        };
        let object = self.derive(kind, parent.as_ref())?;
        let handle = Handle { kind, object };
        self.state.replace(handle.clone());
        tracing::debug!(%kind, id = %handle.object.id, "handle acquired");
        Ok(handle)
    }

    /// Unconditionally re-derive every kind from the application root down.
    ///
    /// Kinds with no backing object are left unbound. An unreachable
    /// application root or a transport failure at any depth is an error and
    /// discards the whole state.
    pub fn refresh_all(&mut self) -> Result<RefreshSummary, SessionError> {
        self.revive()?;
        let mut fresh = SessionState::default();
        let mut unbound = Vec::new();
        for &kind in SessionKind::all() {
            let parent = match kind.parent() {
                None => None,
                Some(parent) => match fresh.get(parent) {
                    Some(h) => Some(h.object.clone()),
                    None => {
                        unbound.push(kind);
                        continue;
                    }
                },
            };
            match self.derive(kind, parent.as_ref()) {
                Ok(object) => fresh.replace(Handle { kind, object }),
                Err(e)
                    if kind == SessionKind::Application
                        || e.is_link_loss()
                        || self.link.is_dead() =>
                {
                    *self.state = SessionState::default();
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(%kind, error = %e, "left unbound after refresh");
                    unbound.push(kind);
                }
            }
        }
        *self.state = fresh;
        let bound: Vec<SessionKind> = self.state.handles.keys().copied().collect();
        tracing::info!(?bound, ?unbound, "session refreshed");
        Ok(RefreshSummary { bound, unbound })
    }

    /// Replace the handle for `kind` after an operation that deliberately
    /// switched context (project load, new current timeline). Handles derived
    /// from it are dropped.
    pub fn adopt(&mut self, kind: SessionKind, object: ObjectRef) {
        self.forget(kind);
        self.state.replace(Handle { kind, object });
    }

    /// Drop the handle for `kind` and everything derived from it.
    pub fn forget(&mut self, kind: SessionKind) {
        for &k in SessionKind::all() {
            if k == kind || k.descends_from(kind) {
                self.state.clear(k);
            }
        }
    }

    /// Call a method on the object behind `kind`.
    ///
    /// A timeout or lost connection is never resent: the call may already
    /// have run, so it fails as `Disconnected` and the next `ensure`
    /// reconnects. Other failures are probed: if the handle is still alive
    /// the call is retried as-is, otherwise (or on a stale reference) the
    /// handle is re-acquired first. Retries are bounded by the profile's
    /// `transient_retries`.
    pub fn invoke(
        &mut self,
        kind: SessionKind,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError> {
        let retries = self.profile.placement.transient_retries;
        let mut handle = self.ensure(kind)?;
        let mut attempt = 0;
        loop {
            let err = match self.link.call_object(&handle.object, method, args.clone()) {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if err.is_link_fatal() {
                return Err(SessionError::transport(kind, &err));
            }
            if attempt >= retries {
                return Err(SessionError::Remote(err));
            }
            attempt += 1;
            let stale = matches!(err, RemoteError::StaleObject { .. });
            let alive = !stale
                && self
                    .profile
                    .recipe(kind)
                    .is_some_and(|r| probe(self.link, &handle.object, &r.probe) == Liveness::Alive);
            if self.link.is_dead() {
                return Err(SessionError::Disconnected {
                    kind,
                    cause: DisconnectCause::Transport,
                    detail: format!("link lost while checking {method} after: {err}"),
                });
            }
            if alive {
                tracing::debug!(%kind, method, attempt, error = %err, "transient failure, retrying");
            } else {
                handle = self.ensure(kind)?;
            }
        }
    }

    /// Call a method on a non-session object (folder, media item, timeline
    /// item). Such references are never cached across operations.
    pub fn call(
        &mut self,
        object: &ObjectRef,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SessionError> {
        self.link
            .call_object(object, method, args)
            .map_err(|e| SessionError::from_call(SessionKind::Application, e))
    }

    /// Reconnect a transport that was marked dead. Any cached handle belongs to
    /// the old connection and is discarded either way.
    fn revive(&mut self) -> Result<(), SessionError> {
        if !self.link.is_dead() {
            return Ok(());
        }
        *self.state = SessionState::default();
        match self.link.reconnect() {
            Ok(()) => {
                tracing::info!(endpoint = %self.link.describe(), "scripting link reconnected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconnect failed");
                Err(SessionError::transport(SessionKind::Application, &e))
            }
        }
    }

    /// Walk the kind's accessor chain starting at `parent`.
    fn derive(
        &mut self,
        kind: SessionKind,
        parent: Option<&ObjectRef>,
    ) -> Result<ObjectRef, SessionError> {
        let recipe = self
            .profile
            .recipe(kind)
            .ok_or_else(|| SessionError::missing(kind, "no recipe in logic profile".into()))?;
        let mut current = parent.cloned();
        for step in &recipe.derive {
            let reply = self
                .link
                .call(current.as_ref(), &step.method, step.args.clone())
                .map_err(|e| SessionError::transport(kind, &e))?;
            current = Some(value::object(&reply).ok_or_else(|| {
                SessionError::missing(kind, format!("{} returned no object", step.method))
            })?);
        }
        current.ok_or_else(|| SessionError::missing(kind, "empty derivation".into()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeResolve;
    use serde_json::json;

    fn manager(peer: &FakeResolve) -> SessionProxyManager {
        let link = Link::open(Box::new(peer.clone())).unwrap();
        SessionProxyManager::new(link, Arc::new(LogicProfile::default()))
    }

    #[test]
    fn ensure_twice_probes_once_and_does_not_reacquire() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        let first = mgr.ensure(SessionKind::Project).unwrap();

        peer.clear_calls();
        let second = mgr.ensure(SessionKind::Project).unwrap();
        assert_eq!(first, second);
        let calls = peer.calls();
        assert_eq!(calls.len(), 1, "{calls:?}");
        assert_eq!(calls[0].method, "GetName");
        assert_eq!(peer.count("GetCurrentProject"), 0);
    }

    #[test]
    fn stale_handle_is_replaced_transparently() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        let old = mgr.ensure(SessionKind::MediaLibrary).unwrap();

        peer.invalidate("Project");
        peer.invalidate("MediaPool");
        let new = mgr.ensure(SessionKind::MediaLibrary).unwrap();
        assert_ne!(old, new);
        assert_eq!(new.kind(), SessionKind::MediaLibrary);
        // The application and project manager handles survived and were only probed.
        assert_eq!(peer.count("scriptapp"), 1);
        assert_eq!(peer.count("GetProjectManager"), 1);
    }

    #[test]
    fn no_open_timeline_is_no_such_object() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        let err = mgr.ensure(SessionKind::Timeline).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Disconnected {
                kind: SessionKind::Timeline,
                cause: DisconnectCause::NoSuchObject,
                ..
            }
        ));
    }

    #[test]
    fn refresh_all_follows_ui_project_switch() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        let project = mgr.ensure(SessionKind::Project).unwrap();

        // A UI switch leaves the old handle alive, so ensure alone cannot see it.
        peer.switch_project("Other");
        assert_eq!(mgr.ensure(SessionKind::Project).unwrap(), project);

        let summary = mgr.refresh_all().unwrap();
        assert!(summary.unbound.contains(&SessionKind::Timeline));
        assert!(summary.bound.contains(&SessionKind::MediaLibrary));
        let name = mgr
            .with_session(|s| s.invoke(SessionKind::Project, "GetName", vec![]))
            .unwrap();
        assert_eq!(name, json!("Other"));
    }

    #[test]
    fn refresh_all_without_editor_discards_state() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        mgr.ensure(SessionKind::Project).unwrap();
        peer.disconnect();
        peer.set_reachable(false);
        // First failure marks the link dead, the refresh then cannot reconnect.
        assert!(mgr.ensure(SessionKind::Project).is_err());
        let err = mgr.refresh_all().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Disconnected {
                kind: SessionKind::Application,
                cause: DisconnectCause::Transport,
                ..
            }
        ));
    }

    #[test]
    fn lost_connection_is_rebuilt_on_next_ensure() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        mgr.ensure(SessionKind::Project).unwrap();
        assert_eq!(peer.connect_count(), 1);

        peer.disconnect();
        let handle = mgr.ensure(SessionKind::Project).unwrap();
        assert_eq!(peer.connect_count(), 2);
        let name = mgr
            .with_session(|s| s.call(handle.object(), "GetName", vec![]))
            .unwrap();
        assert_eq!(name, json!("Untitled Project"));
    }

    #[test]
    fn transient_failure_is_retried_once_without_refresh() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        mgr.ensure(SessionKind::Project).unwrap();
        peer.clear_calls();

        peer.fail_next("GetTimelineCount", 1);
        let count = mgr
            .with_session(|s| s.invoke(SessionKind::Project, "GetTimelineCount", vec![]))
            .unwrap();
        assert_eq!(count, json!(0));
        assert_eq!(peer.count("GetTimelineCount"), 2);
        assert_eq!(peer.count("GetCurrentProject"), 0);
    }

    #[test]
    fn persistent_failure_surfaces_as_remote_error() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        peer.fail_next("GetTimelineCount", 5);
        let err = mgr
            .with_session(|s| s.invoke(SessionKind::Project, "GetTimelineCount", vec![]))
            .unwrap_err();
        assert!(matches!(err, SessionError::Remote(RemoteError::Call { .. })));
    }

    #[test]
    fn timed_out_call_is_not_resent() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        mgr.ensure(SessionKind::Project).unwrap();

        // The job is queued, then the reply is lost.
        peer.time_out_after("AddRenderJob", 1);
        let err = mgr
            .with_session(|s| s.invoke(SessionKind::Project, "AddRenderJob", vec![]))
            .unwrap_err();
        assert!(err.is_link_loss());
        assert_eq!(peer.count("AddRenderJob"), 1);

        // The next ensure reconnects.
        mgr.ensure(SessionKind::Project).unwrap();
        assert_eq!(peer.connect_count(), 2);
    }

    #[test]
    fn refresh_all_reports_transport_loss_below_the_root() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        mgr.ensure(SessionKind::Project).unwrap();

        peer.drop_connection_on("GetCurrentProject");
        let err = mgr.refresh_all().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Disconnected {
                kind: SessionKind::Project,
                cause: DisconnectCause::Transport,
                ..
            }
        ));
        assert!(mgr.link().is_dead());
        peer.clear_calls();
        // Nothing cached survives: the next ensure reconnects and re-derives.
        mgr.ensure(SessionKind::Project).unwrap();
        assert_eq!(peer.count("GetCurrentProject"), 1);
    }

    #[test]
    fn adopt_drops_derived_handles() {
        let peer = FakeResolve::new();
        let mgr = manager(&peer);
        let pool = mgr.ensure(SessionKind::MediaLibrary).unwrap();
        let project = mgr.ensure(SessionKind::Project).unwrap();
        peer.clear_calls();

        mgr.with_session(|s| s.adopt(SessionKind::Project, project.object().clone()));
        let again = mgr.ensure(SessionKind::MediaLibrary).unwrap();
        assert_eq!(again, pool);
        // Re-derived rather than probed from cache.
        assert_eq!(peer.count("GetMediaPool"), 1);
    }

    #[test]
    fn kind_lineage() {
        assert!(SessionKind::Timeline.descends_from(SessionKind::Application));
        assert!(!SessionKind::Timeline.descends_from(SessionKind::MediaLibrary));
        assert_eq!(SessionKind::Application.parent(), None);
    }
}
