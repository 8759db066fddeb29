//! Session registry
//!
//! Tracks the set of live terminal sessions: metadata, connection status,
//! and the active selection. Owns no I/O. Every mutation synchronously
//! notifies registered observers with the full ordered session list, so
//! observers are idempotent re-renderers rather than diff consumers.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use splitmux_protocol::SessionStatus;
use tracing::debug;

/// Opaque session identifier, time+counter derived so ids sort in creation
/// order even across rapid back-to-back creates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    fn generate(counter: u64) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self(format!("session-{}-{}", millis, counter))
    }

    #[cfg(test)]
    pub(crate) fn for_tests(n: u64) -> Self {
        Self(format!("session-test-{}", n))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the project a session was opened for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: String,
    pub path: PathBuf,
}

/// One terminal session, owned exclusively by the registry
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    name: String,
    project: Option<ProjectRef>,
    status: SessionStatus,
    created_at: SystemTime,
    /// Creation sequence number, tie-breaker for same-millisecond creates
    seq: u64,
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> Option<&ProjectRef> {
        self.project.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Creation timestamp as Unix milliseconds
    pub fn created_at_millis(&self) -> u128 {
        self.created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }

    /// Snapshot for observers and the renderer
    pub fn to_info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            project: self.project.clone(),
            status: self.status,
            created_at: self.created_at_millis() as u64,
        }
    }
}

/// Serializable session snapshot handed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub project: Option<ProjectRef>,
    pub status: SessionStatus,
    pub created_at: u64,
}

/// Observer callback: full ordered list plus current active id
pub type RegistryObserver = Box<dyn Fn(&[SessionInfo], Option<&SessionId>) + Send>;

/// Registry of live sessions with creation-order listing
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active: Option<SessionId>,
    counter: u64,
    observers: Vec<RegistryObserver>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            active: None,
            counter: 0,
            observers: Vec::new(),
        }
    }

    /// Register an observer; immediately called with the current state
    pub fn subscribe(&mut self, observer: RegistryObserver) {
        let infos = self.infos();
        observer(&infos, self.active.as_ref());
        self.observers.push(observer);
    }

    fn notify(&self) {
        let infos = self.infos();
        for observer in &self.observers {
            observer(&infos, self.active.as_ref());
        }
    }

    fn infos(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(Session::to_info).collect()
    }

    /// Create a session; it becomes active only if it is the first one
    pub fn create(&mut self, project: Option<ProjectRef>) -> SessionId {
        self.counter += 1;
        let id = SessionId::generate(self.counter);
        let name = match &project {
            Some(p) => p.name.clone(),
            None => format!("Terminal {}", self.counter),
        };

        debug!(session = %id, name = %name, "Creating session");

        self.sessions.push(Session {
            id: id.clone(),
            name,
            project,
            status: SessionStatus::Disconnected,
            created_at: SystemTime::now(),
            seq: self.counter,
        });

        if self.active.is_none() {
            self.active = Some(id.clone());
        }

        self.notify();
        id
    }

    /// Remove a session; if it was active, activity falls to the
    /// earliest-created remaining session, or none
    pub fn remove(&mut self, id: &SessionId) -> bool {
        let Some(idx) = self.sessions.iter().position(|s| &s.id == id) else {
            return false;
        };
        self.sessions.remove(idx);

        if self.active.as_ref() == Some(id) {
            self.active = self
                .sessions
                .iter()
                .min_by_key(|s| s.seq)
                .map(|s| s.id.clone());
        }

        self.notify();
        true
    }

    /// Make a session the active one
    pub fn set_active(&mut self, id: &SessionId) -> bool {
        if self.sessions.iter().any(|s| &s.id == id) {
            self.active = Some(id.clone());
            self.notify();
            true
        } else {
            false
        }
    }

    /// Update a session's connection status
    pub fn update_status(&mut self, id: &SessionId, status: SessionStatus) -> bool {
        let Some(session) = self.get_mut(id) else {
            return false;
        };
        session.status = status;
        self.notify();
        true
    }

    /// Change a session's project, refreshing the display name from it
    pub fn update_project(&mut self, id: &SessionId, project: Option<ProjectRef>) -> bool {
        let Some(session) = self.get_mut(id) else {
            return false;
        };
        if let Some(p) = &project {
            session.name = p.name.clone();
        }
        session.project = project;
        self.notify();
        true
    }

    /// Rename a session
    pub fn rename(&mut self, id: &SessionId, name: impl Into<String>) -> bool {
        let Some(session) = self.get_mut(id) else {
            return false;
        };
        session.name = name.into();
        self.notify();
        true
    }

    /// Sessions in creation order (stable tab ordering, distinct from the
    /// spatial ordering the pane tree uses for focus navigation)
    pub fn all(&self) -> Vec<&Session> {
        let mut out: Vec<&Session> = self.sessions.iter().collect();
        out.sort_by_key(|s| s.seq);
        out
    }

    /// Ordered snapshots for the renderer
    pub fn all_infos(&self) -> Vec<SessionInfo> {
        self.all().into_iter().map(Session::to_info).collect()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| &s.id == id)
    }

    pub fn active(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions)
            .field("active", &self.active)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn project(name: &str) -> ProjectRef {
        ProjectRef {
            name: name.into(),
            path: PathBuf::from(format!("/workspace/{}", name)),
        }
    }

    #[test]
    fn test_create_first_session_becomes_active() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(None);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active(), Some(&id));
        assert_eq!(registry.get(&id).unwrap().status(), SessionStatus::Disconnected);
    }

    #[test]
    fn test_second_session_does_not_steal_activity() {
        let mut registry = SessionRegistry::new();
        let first = registry.create(None);
        let _second = registry.create(None);

        assert_eq!(registry.active(), Some(&first));
    }

    #[test]
    fn test_default_names() {
        let mut registry = SessionRegistry::new();
        let plain = registry.create(None);
        let named = registry.create(Some(project("api-server")));

        assert_eq!(registry.get(&plain).unwrap().name(), "Terminal 1");
        assert_eq!(registry.get(&named).unwrap().name(), "api-server");
    }

    #[test]
    fn test_remove_active_falls_to_earliest_created() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(None);
        let b = registry.create(None);
        let c = registry.create(None);

        registry.set_active(&b);
        assert!(registry.remove(&b));

        // Earliest-created remaining session wins
        assert_eq!(registry.active(), Some(&a));

        registry.remove(&a);
        assert_eq!(registry.active(), Some(&c));

        registry.remove(&c);
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn test_remove_inactive_keeps_active() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(None);
        let b = registry.create(None);

        assert!(registry.remove(&b));
        assert_eq!(registry.active(), Some(&a));
    }

    #[test]
    fn test_remove_unknown_returns_false() {
        let mut registry = SessionRegistry::new();
        registry.create(None);

        let ghost = SessionId::for_tests(99);
        assert!(!registry.remove(&ghost));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_active_unknown_returns_false() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(None);

        assert!(!registry.set_active(&SessionId::for_tests(1)));
        assert_eq!(registry.active(), Some(&a));
    }

    #[test]
    fn test_update_status() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(None);

        assert!(registry.update_status(&id, SessionStatus::Connecting));
        assert_eq!(registry.get(&id).unwrap().status(), SessionStatus::Connecting);

        assert!(registry.update_status(&id, SessionStatus::Connected));
        assert_eq!(registry.get(&id).unwrap().status(), SessionStatus::Connected);

        assert!(!registry.update_status(&SessionId::for_tests(1), SessionStatus::Error));
    }

    #[test]
    fn test_update_project_refreshes_name() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(None);
        assert_eq!(registry.get(&id).unwrap().name(), "Terminal 1");

        registry.update_project(&id, Some(project("frontend")));
        assert_eq!(registry.get(&id).unwrap().name(), "frontend");

        // Clearing the project keeps the last display name
        registry.update_project(&id, None);
        assert_eq!(registry.get(&id).unwrap().name(), "frontend");
        assert!(registry.get(&id).unwrap().project().is_none());
    }

    #[test]
    fn test_rename() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(None);

        assert!(registry.rename(&id, "build watcher"));
        assert_eq!(registry.get(&id).unwrap().name(), "build watcher");
    }

    #[test]
    fn test_all_is_creation_ordered() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(None);
        let b = registry.create(None);
        let c = registry.create(None);

        let ids: Vec<_> = registry.all().iter().map(|s| s.id().clone()).collect();
        assert_eq!(ids, vec![a, b.clone(), c]);

        registry.remove(&b);
        let ids: Vec<_> = registry.all().iter().map(|s| s.id().clone()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_session_ids_are_unique_and_ordered() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(None);
        let b = registry.create(None);

        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_observers_notified_on_every_mutation() {
        let mut registry = SessionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        registry.subscribe(Box::new(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1); // initial snapshot

        let id = registry.create(None);
        registry.update_status(&id, SessionStatus::Connecting);
        registry.rename(&id, "x");
        registry.set_active(&id);
        registry.remove(&id);

        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_observer_sees_full_list_and_active() {
        let mut registry = SessionRegistry::new();
        let seen: Arc<std::sync::Mutex<Vec<(usize, bool)>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        registry.subscribe(Box::new(move |infos, active| {
            seen_clone
                .lock()
                .unwrap()
                .push((infos.len(), active.is_some()));
        }));

        registry.create(None);
        registry.create(None);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(0, false), (1, true), (2, true)]);
    }

    #[test]
    fn test_to_info_roundtrip() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(Some(project("tool")));
        let info = registry.get(&id).unwrap().to_info();

        assert_eq!(info.id, id);
        assert_eq!(info.name, "tool");
        assert_eq!(info.status, SessionStatus::Disconnected);
        assert!(info.created_at > 0);

        let json = serde_json::to_string(&info).unwrap();
        let back: SessionInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
