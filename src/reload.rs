//! Live reload of the session logic.
//!
//! The connection ([`Link`]) lives for the whole process. The logic built on
//! top of it ([`ResolveLogic`]: a logic profile plus the session proxies
//! derived with it) can be rebuilt from its source and swapped in without
//! dropping the connection. If loading the new logic fails, the running
//! logic stays untouched.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Serialize;

use crate::logic::{LogicError, LogicProfile};
use crate::remote::{Link, Transport};
use crate::session::{RefreshSummary, SessionProxyManager};

/// Where logic profiles come from.
pub trait LogicSource: Send + Sync {
    fn load(&self) -> Result<LogicProfile, LogicError>;
    fn describe(&self) -> String;
}

/// A `logic.json` on disk, re-read on every reload.
pub struct FileLogicSource {
    path: PathBuf,
}

impl FileLogicSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogicSource for FileLogicSource {
    fn load(&self) -> Result<LogicProfile, LogicError> {
        LogicProfile::load(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// The compiled-in profile. Reloading it only rebuilds the session proxies.
pub struct BuiltinLogicSource;

impl LogicSource for BuiltinLogicSource {
    fn load(&self) -> Result<LogicProfile, LogicError> {
        Ok(LogicProfile::default())
    }

    fn describe(&self) -> String {
        "builtin".to_string()
    }
}

/// One generation of session logic bound to the shared connection.
pub struct ResolveLogic {
    sessions: SessionProxyManager,
    generation: u64,
}

impl ResolveLogic {
    pub fn new(link: Arc<Link>, profile: LogicProfile, generation: u64) -> Self {
        Self {
            sessions: SessionProxyManager::new(link, Arc::new(profile)),
            generation,
        }
    }

    pub fn sessions(&self) -> &SessionProxyManager {
        &self.sessions
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn revision(&self) -> &str {
        &self.sessions.profile().revision
    }

    pub fn link(&self) -> &Arc<Link> {
        self.sessions.link()
    }

    pub fn profile(&self) -> &LogicProfile {
        self.sessions.profile()
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ReloadReport {
    /// False when the new logic could not be loaded; the old logic keeps running.
    pub success: bool,
    /// Generation now serving requests.
    pub generation: u64,
    pub revision: String,
    pub source: String,
    /// The connection object is the same before and after.
    pub transport_preserved: bool,
    /// The new logic re-derived the application root.
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RefreshSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct LiveReloadController {
    current: Mutex<Arc<ResolveLogic>>,
    source: Box<dyn LogicSource>,
    generation: AtomicU64,
    reloading: Mutex<()>,
}

impl LiveReloadController {
    /// Open the connection and build the first generation.
    ///
    /// An unreachable editor is not fatal here: the link reconnects on first use.
    pub fn start(
        transport: Box<dyn Transport>,
        source: Box<dyn LogicSource>,
    ) -> Result<Self, LogicError> {
        let profile = source.load()?;
        let link = Arc::new(Link::new(transport));
        match link.reconnect() {
            Ok(()) => tracing::info!(endpoint = %link.describe(), "scripting link connected"),
            Err(e) => tracing::warn!(endpoint = %link.describe(), error = %e, "editor not reachable yet"),
        }
        let logic = ResolveLogic::new(link, profile, 1);
        if let Err(e) = logic.sessions().refresh_all() {
            tracing::warn!(error = %e, "initial session refresh failed");
        }
        tracing::info!(revision = logic.revision(), source = %source.describe(), "session logic loaded");
        Ok(Self {
            current: Mutex::new(Arc::new(logic)),
            source,
            generation: AtomicU64::new(1),
            reloading: Mutex::new(()),
        })
    }

    /// The logic currently serving requests. Callers keep their `Arc` for the
    /// length of one operation, so a reload never cuts an operation short.
    pub fn current(&self) -> Arc<ResolveLogic> {
        Arc::clone(&self.current.lock())
    }

    pub fn source(&self) -> String {
        self.source.describe()
    }

    /// Rebuild the logic from its source and swap it in.
    pub fn reload(&self) -> ReloadReport {
        let _reloading = self.reloading.lock();
        let old = self.current();

        let profile = match self.source.load() {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, generation = old.generation(), "reload failed, keeping current logic");
                return ReloadReport {
                    success: false,
                    generation: old.generation(),
                    revision: old.revision().to_string(),
                    source: self.source.describe(),
                    transport_preserved: true,
                    connected: !old.link().is_dead(),
                    summary: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fresh = ResolveLogic::new(Arc::clone(old.link()), profile, generation);
        let refreshed = fresh.sessions().refresh_all();
        let transport_preserved = Arc::ptr_eq(old.link(), fresh.link());
        let fresh = Arc::new(fresh);
        *self.current.lock() = Arc::clone(&fresh);

        let (connected, summary, error) = match refreshed {
            Ok(summary) => (true, Some(summary), None),
            Err(e) => {
                tracing::warn!(error = %e, "new logic could not reach the editor");
                (false, None, Some(e.to_string()))
            }
        };
        tracing::info!(
            generation,
            revision = fresh.revision(),
            transport_preserved,
            connected,
            "session logic reloaded"
        );
        ReloadReport {
            success: true,
            generation,
            revision: fresh.revision().to_string(),
            source: self.source.describe(),
            transport_preserved,
            connected,
            summary,
            error,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeResolve;
    use crate::session::SessionKind;

    fn write_profile(path: &Path, revision: &str) {
        let profile = LogicProfile {
            revision: revision.to_string(),
            ..LogicProfile::default()
        };
        std::fs::write(path, serde_json::to_string_pretty(&profile).unwrap()).unwrap();
    }

    fn start(peer: &FakeResolve, path: &Path) -> LiveReloadController {
        LiveReloadController::start(Box::new(peer.clone()), Box::new(FileLogicSource::new(path)))
            .unwrap()
    }

    #[test]
    fn reload_swaps_logic_and_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logic.json");
        write_profile(&path, "r1");
        let peer = FakeResolve::new();
        let controller = start(&peer, &path);
        let before = controller.current();
        assert_eq!(before.revision(), "r1");
        assert_eq!(peer.connect_count(), 1);

        write_profile(&path, "r2");
        let report = controller.reload();
        assert!(report.success);
        assert!(report.transport_preserved);
        assert!(report.connected);
        assert_eq!(report.generation, 2);
        assert_eq!(report.revision, "r2");
        assert_eq!(peer.connect_count(), 1);

        let after = controller.current();
        assert!(Arc::ptr_eq(before.link(), after.link()));
        assert_eq!(after.revision(), "r2");
        after.sessions().ensure(SessionKind::Project).unwrap();
    }

    #[test]
    fn failed_reload_leaves_running_logic_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logic.json");
        write_profile(&path, "good");
        let peer = FakeResolve::new();
        let controller = start(&peer, &path);

        std::fs::write(&path, "{ \"revision\": ").unwrap();
        let report = controller.reload();
        assert!(!report.success);
        assert_eq!(report.generation, 1);
        assert_eq!(report.revision, "good");
        assert!(report.error.is_some());

        let current = controller.current();
        assert_eq!(current.generation(), 1);
        current.sessions().ensure(SessionKind::Timeline).unwrap_err();
        current.sessions().ensure(SessionKind::Project).unwrap();
        assert_eq!(peer.connect_count(), 1);
    }

    #[test]
    fn new_generation_rederives_instead_of_inheriting_handles() {
        let peer = FakeResolve::new();
        let controller =
            LiveReloadController::start(Box::new(peer.clone()), Box::new(BuiltinLogicSource)).unwrap();
        let derived = peer.count("GetCurrentProject");
        controller.reload();
        assert!(peer.count("GetCurrentProject") > derived);
    }

    #[test]
    fn old_generation_finishes_its_work_after_a_swap() {
        let peer = FakeResolve::new();
        let controller =
            LiveReloadController::start(Box::new(peer.clone()), Box::new(BuiltinLogicSource)).unwrap();
        let held = controller.current();
        controller.reload();
        assert_eq!(controller.current().generation(), 2);
        assert_eq!(held.generation(), 1);
        held.sessions().ensure(SessionKind::MediaLibrary).unwrap();
    }

    #[test]
    fn reload_while_editor_is_down_reports_disconnected() {
        let peer = FakeResolve::new();
        let controller =
            LiveReloadController::start(Box::new(peer.clone()), Box::new(BuiltinLogicSource)).unwrap();
        peer.disconnect();
        peer.set_reachable(false);
        // The first failing call marks the link dead; refresh then cannot revive it.
        let report = controller.reload();
        assert!(report.success);
        assert!(!report.connected);
        assert!(report.transport_preserved);
    }

    #[test]
    fn link_lost_mid_refresh_reports_disconnected() {
        let peer = FakeResolve::new();
        let controller =
            LiveReloadController::start(Box::new(peer.clone()), Box::new(BuiltinLogicSource)).unwrap();
        peer.drop_connection_on("GetCurrentProject");
        let report = controller.reload();
        assert!(report.success);
        assert!(!report.connected);
        assert!(report.summary.is_none());
        assert!(controller.current().link().is_dead());
    }

    #[test]
    fn start_without_editor_still_builds_logic() {
        let peer = FakeResolve::new();
        peer.set_reachable(false);
        let controller =
            LiveReloadController::start(Box::new(peer.clone()), Box::new(BuiltinLogicSource)).unwrap();
        assert_eq!(controller.current().generation(), 1);
        assert!(controller.current().link().is_dead());
        peer.set_reachable(true);
        controller.current().sessions().ensure(SessionKind::Project).unwrap();
        assert_eq!(peer.connect_count(), 1);
    }
}
