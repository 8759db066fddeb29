//! Session orchestrator
//!
//! Composition root wiring the pane tree, the session registry, and one
//! process bridge per session. External collaborators (UI, commands) call
//! the operations here; bridge events funnel into one merged channel that
//! the embedding application drains from its single control thread.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use splitmux_protocol::{SessionStatus, SpawnOptions, SplitDirection};
use splitmux_utils::{Result, SplitmuxError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeConfig, BridgeEvent, ProcessBridge, KILL_GRACE};
use crate::debounce::{ResizeDebouncer, RESIZE_DEBOUNCE};
use crate::layout::{LayoutSnapshot, PaneId, PaneLayoutTree};
use crate::registry::{ProjectRef, SessionId, SessionInfo, SessionRegistry};

/// Callback receiving raw output for a session (terminal-content rendering)
pub type OutputSink = Box<dyn Fn(&SessionId, &str) + Send>;

/// Orchestrator configuration, supplied once at construction time
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Boundary root forwarded as the host boundary on every session's
    /// first spawn (e.g. the workspace root)
    pub boundary: PathBuf,
    /// Path to the splitmux-host binary
    pub host_program: PathBuf,
    /// Shell executable spawned for new sessions
    pub shell: String,
    /// Bridge shutdown grace period
    pub kill_grace: Duration,
    /// Quiet window for resize debouncing
    pub resize_debounce: Duration,
}

impl OrchestratorConfig {
    pub fn new(boundary: impl Into<PathBuf>, host_program: impl Into<PathBuf>) -> Self {
        Self {
            boundary: boundary.into(),
            host_program: host_program.into(),
            shell: default_shell().to_string(),
            kill_grace: KILL_GRACE,
            resize_debounce: RESIZE_DEBOUNCE,
        }
    }
}

#[cfg(windows)]
fn default_shell() -> &'static str {
    "powershell.exe"
}

#[cfg(not(windows))]
fn default_shell() -> &'static str {
    "/bin/bash"
}

/// Composition root for one host view of terminal panes
pub struct SessionOrchestrator {
    config: OrchestratorConfig,
    tree: PaneLayoutTree,
    registry: SessionRegistry,
    bridges: HashMap<SessionId, ProcessBridge>,
    debouncers: HashMap<SessionId, ResizeDebouncer>,
    events_tx: mpsc::UnboundedSender<(SessionId, BridgeEvent)>,
    events_rx: Option<mpsc::UnboundedReceiver<(SessionId, BridgeEvent)>>,
    output_sink: Option<OutputSink>,
}

impl SessionOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            tree: PaneLayoutTree::new(None),
            registry: SessionRegistry::new(),
            bridges: HashMap::new(),
            debouncers: HashMap::new(),
            events_tx,
            events_rx: Some(events_rx),
            output_sink: None,
        }
    }

    /// Install the callback that receives raw terminal output
    pub fn set_output_sink(&mut self, sink: OutputSink) {
        self.output_sink = Some(sink);
    }

    // ==================== Renderer snapshots ====================

    /// Current layout tree snapshot (root node, active pane id)
    pub fn layout(&self) -> LayoutSnapshot {
        self.tree.snapshot()
    }

    /// Ordered session list for tab rendering
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.all_infos()
    }

    /// Currently active session id
    pub fn active_session(&self) -> Option<&SessionId> {
        self.registry.active()
    }

    /// Connection status for a session
    pub fn session_status(&self, id: &SessionId) -> Option<SessionStatus> {
        self.registry.get(id).map(|s| s.status())
    }

    // ==================== Session operations ====================

    /// Create a session (and its host process); attaches to the active
    /// pane if that pane is still empty
    pub fn create_session(&mut self, project: Option<ProjectRef>) -> SessionId {
        let id = self.registry.create(project);

        let active = self.tree.active_pane();
        if self.tree.pane_session(active).is_none() {
            self.tree.set_pane_session(active, Some(id.clone()));
        }

        self.start_session_bridge(&id);
        id
    }

    /// Stop a session's bridge and remove it from the registry and tree
    pub fn remove_session(&mut self, id: &SessionId) -> bool {
        if let Some(mut bridge) = self.bridges.remove(id) {
            bridge.stop();
        }
        self.debouncers.remove(id);

        // Detach from whichever pane held it
        for pane in self.tree.all_pane_ids() {
            if self.tree.pane_session(pane) == Some(id) {
                self.tree.set_pane_session(pane, None);
            }
        }

        self.registry.remove(id)
    }

    /// Make a session the active one
    pub fn set_active_session(&mut self, id: &SessionId) -> bool {
        self.registry.set_active(id)
    }

    /// Rename a session
    pub fn rename_session(&mut self, id: &SessionId, name: impl Into<String>) -> bool {
        self.registry.rename(id, name)
    }

    /// Change a session's project reference
    pub fn set_session_project(&mut self, id: &SessionId, project: Option<ProjectRef>) -> bool {
        self.registry.update_project(id, project)
    }

    /// Send input to a session's shell
    pub fn write(&self, id: &SessionId, data: impl Into<String>) {
        match self.bridges.get(id) {
            Some(bridge) => bridge.write(data),
            None => warn!(session = %id, "Write to unknown session dropped"),
        }
    }

    /// Forward new geometry to a session, debounced against drag storms
    pub fn resize_session(&self, id: &SessionId, cols: u16, rows: u16) {
        match self.debouncers.get(id) {
            Some(debouncer) => debouncer.submit(cols, rows),
            None => warn!(session = %id, "Resize for unknown session dropped"),
        }
    }

    /// Restart a session's host process
    pub async fn restart(&mut self, id: &SessionId) -> bool {
        let Some(bridge) = self.bridges.get_mut(id) else {
            return false;
        };
        info!(session = %id, "Restarting session host");
        let started = bridge.restart().await;
        if started {
            self.spawn_shell(id);
        }
        started
    }

    // ==================== Pane operations ====================

    /// Split a pane, backing the fresh pane with a brand-new session
    pub fn split(&mut self, pane_id: PaneId, direction: SplitDirection) -> Result<(PaneId, SessionId)> {
        if !self.tree.can_split(pane_id) {
            return Err(SplitmuxError::NotAPane(pane_id.to_string()));
        }

        // New session inherits the project of the pane being split
        let project = self
            .tree
            .pane_session(pane_id)
            .and_then(|sid| self.registry.get(sid))
            .and_then(|s| s.project().cloned());

        let session_id = self.registry.create(project);
        let new_pane = self.tree.split(pane_id, direction, Some(session_id.clone()))?;

        self.start_session_bridge(&session_id);
        self.registry.set_active(&session_id);

        debug!(pane = %new_pane, session = %session_id, "Split pane");
        Ok((new_pane, session_id))
    }

    /// Close a pane, tearing down the session it hosted
    pub fn close(&mut self, pane_id: PaneId) -> Result<()> {
        let removed = self.tree.close(pane_id)?;
        if let Some(session_id) = removed {
            self.remove_session(&session_id);
        }
        Ok(())
    }

    /// Focus a pane (and its session); notify=true asks for a re-render
    pub fn set_active_pane(&mut self, pane_id: PaneId, notify: bool) -> bool {
        let applied = self.tree.set_active(pane_id, notify);
        if let Some(session_id) = self.tree.pane_session(pane_id).cloned() {
            self.registry.set_active(&session_id);
        }
        applied
    }

    /// Overwrite a split's size pair (values clamped by the tree)
    pub fn resize_split(&mut self, split_id: PaneId, sizes: [u8; 2]) -> Result<()> {
        self.tree.resize(split_id, sizes)
    }

    /// Move focus to the next pane in spatial order
    pub fn focus_next(&mut self) -> PaneId {
        let pane = self.tree.focus_next();
        self.sync_active_session(pane);
        pane
    }

    /// Move focus to the previous pane in spatial order
    pub fn focus_previous(&mut self) -> PaneId {
        let pane = self.tree.focus_previous();
        self.sync_active_session(pane);
        pane
    }

    fn sync_active_session(&mut self, pane: PaneId) {
        if let Some(session_id) = self.tree.pane_session(pane).cloned() {
            self.registry.set_active(&session_id);
        }
    }

    // ==================== Event loop ====================

    /// Apply one bridge event to the registry and renderer surfaces
    pub fn process_event(&mut self, id: &SessionId, event: BridgeEvent) {
        match event {
            BridgeEvent::Status(status) => {
                self.registry.update_status(id, status);
            }
            BridgeEvent::Data(data) => {
                if let Some(sink) = &self.output_sink {
                    sink(id, &data);
                }
            }
            BridgeEvent::Exit(code) => {
                info!(session = %id, code, "Session shell exited");
                self.registry
                    .update_status(id, SessionStatus::Disconnected);
            }
            BridgeEvent::Error { message, code } => {
                warn!(session = %id, ?code, message = %message, "Session error");
                self.registry.update_status(id, SessionStatus::Error);
            }
        }
    }

    /// Drain all pending bridge events without blocking
    pub fn poll_events(&mut self) {
        let Some(rx) = self.events_rx.as_mut() else {
            return;
        };
        let mut drained = Vec::new();
        while let Ok(pair) = rx.try_recv() {
            drained.push(pair);
        }
        for (id, event) in drained {
            self.process_event(&id, event);
        }
    }

    /// Take the merged event receiver for a caller-owned control loop
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<(SessionId, BridgeEvent)>> {
        self.events_rx.take()
    }

    /// Stop every bridge; shutdown latency is bounded by the grace period
    pub fn shutdown(&mut self) {
        info!(sessions = self.bridges.len(), "Shutting down all sessions");
        for (_, mut bridge) in self.bridges.drain() {
            bridge.stop();
        }
        self.debouncers.clear();
    }

    // ==================== Internals ====================

    /// Wire up a bridge for a freshly created session and request its shell
    fn start_session_bridge(&mut self, id: &SessionId) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let merged = self.events_tx.clone();
        let session_id = id.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if merged.send((session_id.clone(), event)).is_err() {
                    break;
                }
            }
        });

        let mut bridge = ProcessBridge::new(
            BridgeConfig {
                host_program: self.config.host_program.clone(),
                boundary: self.config.boundary.clone(),
                kill_grace: self.config.kill_grace,
            },
            tx,
        );

        if bridge.start() {
            if let Some(sink) = bridge.message_sender() {
                self.debouncers.insert(
                    id.clone(),
                    ResizeDebouncer::new(self.config.resize_debounce, sink),
                );
            }
        }
        self.bridges.insert(id.clone(), bridge);
        self.spawn_shell(id);
    }

    fn spawn_shell(&self, id: &SessionId) {
        let cwd = self
            .registry
            .get(id)
            .and_then(|s| s.project())
            .map(|p| p.path.clone())
            .unwrap_or_else(|| self.config.boundary.clone());

        if let Some(bridge) = self.bridges.get(id) {
            bridge.spawn(SpawnOptions::new(
                self.config.shell.clone(),
                cwd.to_string_lossy().into_owned(),
            ));
        }
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("panes", &self.tree.pane_count())
            .field("sessions", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitmux_protocol::ErrorCode;
    use std::sync::{Arc, Mutex};

    fn test_config() -> OrchestratorConfig {
        // A host program that cannot exist: bridges fail closed, which is
        // exactly what these wiring tests want.
        OrchestratorConfig::new("/workspace", "/nonexistent/splitmux-host")
    }

    #[tokio::test]
    async fn test_create_session_attaches_to_empty_active_pane() {
        let mut orch = SessionOrchestrator::new(test_config());
        let id = orch.create_session(None);

        let active = orch.tree.active_pane();
        assert_eq!(orch.tree.pane_session(active), Some(&id));
        assert_eq!(orch.active_session(), Some(&id));
        assert_eq!(orch.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_split_creates_session_per_pane() {
        let mut orch = SessionOrchestrator::new(test_config());
        let first = orch.create_session(None);
        let root = orch.tree.active_pane();

        let (new_pane, second) = orch.split(root, SplitDirection::Horizontal).unwrap();

        assert_ne!(first, second);
        assert_eq!(orch.sessions().len(), 2);
        assert_eq!(orch.tree.pane_session(new_pane), Some(&second));
        assert_eq!(orch.active_session(), Some(&second));
        assert_eq!(orch.layout().active_pane, new_pane);
    }

    #[tokio::test]
    async fn test_split_inherits_project() {
        let mut orch = SessionOrchestrator::new(test_config());
        let project = ProjectRef {
            name: "api".into(),
            path: PathBuf::from("/workspace/api"),
        };
        orch.create_session(Some(project.clone()));
        let root = orch.tree.active_pane();

        let (_, second) = orch.split(root, SplitDirection::Vertical).unwrap();
        assert_eq!(
            orch.registry.get(&second).unwrap().project(),
            Some(&project)
        );
    }

    #[tokio::test]
    async fn test_close_pane_removes_its_session() {
        let mut orch = SessionOrchestrator::new(test_config());
        let first = orch.create_session(None);
        let root = orch.tree.active_pane();
        let (new_pane, second) = orch.split(root, SplitDirection::Horizontal).unwrap();

        orch.close(new_pane).unwrap();

        assert_eq!(orch.sessions().len(), 1);
        assert!(orch.registry.get(&second).is_none());
        assert!(orch.registry.get(&first).is_some());
        assert_eq!(orch.tree.pane_count(), 1);
    }

    #[tokio::test]
    async fn test_close_root_pane_fails() {
        let mut orch = SessionOrchestrator::new(test_config());
        orch.create_session(None);
        let root = orch.tree.active_pane();

        assert!(matches!(
            orch.close(root),
            Err(SplitmuxError::CannotClose)
        ));
        assert_eq!(orch.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_host_spawn_surfaces_error_status() {
        let mut orch = SessionOrchestrator::new(test_config());
        let id = orch.create_session(None);

        // Let the forwarder task deliver the bridge's Error transition
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        orch.poll_events();

        assert_eq!(orch.session_status(&id), Some(SessionStatus::Error));
    }

    #[tokio::test]
    async fn test_process_event_updates_registry() {
        let mut orch = SessionOrchestrator::new(test_config());
        let id = orch.create_session(None);

        orch.process_event(&id, BridgeEvent::Status(SessionStatus::Connecting));
        assert_eq!(orch.session_status(&id), Some(SessionStatus::Connecting));

        orch.process_event(&id, BridgeEvent::Status(SessionStatus::Connected));
        assert_eq!(orch.session_status(&id), Some(SessionStatus::Connected));

        orch.process_event(&id, BridgeEvent::Exit(0));
        assert_eq!(orch.session_status(&id), Some(SessionStatus::Disconnected));

        orch.process_event(
            &id,
            BridgeEvent::Error {
                message: "cwd outside boundary".into(),
                code: Some(ErrorCode::CwdOutsideBoundary),
            },
        );
        assert_eq!(orch.session_status(&id), Some(SessionStatus::Error));
    }

    #[tokio::test]
    async fn test_data_events_reach_output_sink() {
        let mut orch = SessionOrchestrator::new(test_config());
        let collected: Arc<Mutex<Vec<(SessionId, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_ref = collected.clone();
        orch.set_output_sink(Box::new(move |id, data| {
            sink_ref.lock().unwrap().push((id.clone(), data.to_string()));
        }));

        let id = orch.create_session(None);
        orch.process_event(&id, BridgeEvent::Data("hello\r\n".into()));

        let collected = collected.lock().unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0], (id, "hello\r\n".to_string()));
    }

    #[tokio::test]
    async fn test_focus_syncs_active_session() {
        let mut orch = SessionOrchestrator::new(test_config());
        let first = orch.create_session(None);
        let root = orch.tree.active_pane();
        let (_, second) = orch.split(root, SplitDirection::Horizontal).unwrap();

        orch.focus_next(); // wraps back to the first pane
        assert_eq!(orch.active_session(), Some(&first));

        orch.focus_previous();
        assert_eq!(orch.active_session(), Some(&second));
    }

    #[tokio::test]
    async fn test_set_active_pane_syncs_session() {
        let mut orch = SessionOrchestrator::new(test_config());
        let first = orch.create_session(None);
        let root = orch.tree.active_pane();
        orch.split(root, SplitDirection::Vertical).unwrap();

        assert!(orch.set_active_pane(root, true));
        assert_eq!(orch.active_session(), Some(&first));
    }

    #[tokio::test]
    async fn test_resize_split_goes_through_tree_clamping() {
        let mut orch = SessionOrchestrator::new(test_config());
        orch.create_session(None);
        let root = orch.tree.active_pane();
        orch.split(root, SplitDirection::Horizontal).unwrap();
        let split_id = orch.tree.root();

        orch.resize_split(split_id, [95, 5]).unwrap();
        assert_eq!(orch.tree.split_sizes(split_id), Some([90, 10]));
    }

    #[tokio::test]
    async fn test_remove_session_detaches_pane() {
        let mut orch = SessionOrchestrator::new(test_config());
        let id = orch.create_session(None);
        let pane = orch.tree.active_pane();

        assert!(orch.remove_session(&id));
        assert_eq!(orch.tree.pane_session(pane), None);
        assert!(orch.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let mut orch = SessionOrchestrator::new(test_config());
        orch.create_session(None);
        let root = orch.tree.active_pane();
        orch.split(root, SplitDirection::Horizontal).unwrap();

        orch.shutdown();
        assert!(orch.bridges.is_empty());
        assert!(orch.debouncers.is_empty());
        // Sessions stay listed; only their hosts are gone
        assert_eq!(orch.sessions().len(), 2);
    }
}
