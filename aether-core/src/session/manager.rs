//! Registry of live sessions.
//!
//! The manager holds a lightweight [`SessionHandle`] per connection so the
//! health endpoint can report counts and states without touching the session
//! tasks themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use super::state::SessionState;

/// Shared view of one session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    created_at: Instant,
    state: AtomicU8,
}

impl SessionHandle {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            state: AtomicU8::new(SessionState::Idle as u8),
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Publishes a new state.
    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Time since the connection was accepted.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Concurrent map of live sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
}

impl SessionManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session under a fresh UUID.
    #[must_use]
    pub fn register(&self) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(Uuid::new_v4()));
        self.sessions.insert(handle.id(), Arc::clone(&handle));
        handle
    }

    /// Looks up a session by id.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drops a session from the registry.
    pub fn remove(&self, id: &Uuid) {
        self.sessions.remove(id);
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions currently in `state`.
    #[must_use]
    pub fn count_in_state(&self, state: SessionState) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }
}
