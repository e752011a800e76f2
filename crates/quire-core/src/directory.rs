//! Bookkeeping list of live sessions

use crate::session::LifecycleState;
use crate::variant::JobKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Identifier handed out by a [`SessionDirectory`]
pub type SessionId = u64;

/// One registered session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEntry {
    pub id: SessionId,
    pub name: String,
    pub job: JobKind,
    pub state: LifecycleState,
}

/// Append/remove-only list of sessions, shared through an `Arc`
#[derive(Debug, Default)]
pub struct SessionDirectory {
    entries: Mutex<Vec<SessionEntry>>,
    next_id: AtomicU64,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, name: impl Into<String>, job: JobKind) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().push(SessionEntry {
            id,
            name: name.into(),
            job,
            state: LifecycleState::Setup,
        });
        id
    }

    pub fn update(&self, id: SessionId, state: LifecycleState) {
        if let Some(entry) = self.lock().iter_mut().find(|e| e.id == id) {
            entry.state = state;
        }
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionEntry> {
        let mut entries = self.lock();
        let pos = entries.iter().position(|e| e.id == id)?;
        Some(entries.remove(pos))
    }

    pub fn get(&self, id: SessionId) -> Option<SessionEntry> {
        self.lock().iter().find(|e| e.id == id).cloned()
    }

    /// Snapshot of all registered sessions, oldest first
    pub fn list(&self) -> Vec<SessionEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
