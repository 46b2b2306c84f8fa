//! In-memory session store.

use super::{PhoneNumber, Session};
use std::collections::HashMap;

/// Sessions keyed by phone number.
///
/// Lives for the lifetime of the process and is never persisted. It does no
/// locking of its own; the session manager owns it behind a lock.
#[derive(Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Get a session by phone number.
    pub fn get(&self, phone: &PhoneNumber) -> Option<&Session> {
        self.sessions.get(phone.as_str())
    }

    /// Get a mutable session by phone number.
    pub fn get_mut(&mut self, phone: &PhoneNumber) -> Option<&mut Session> {
        self.sessions.get_mut(phone.as_str())
    }

    /// Check if a session exists for a phone number.
    pub fn has(&self, phone: &PhoneNumber) -> bool {
        self.sessions.contains_key(phone.as_str())
    }

    /// Insert a session. Callers check [`SessionStore::has`] first.
    pub fn insert(&mut self, session: Session) {
        self.sessions
            .insert(session.phone_number.as_str().to_string(), session);
    }

    /// Remove a session.
    pub fn remove(&mut self, phone: &PhoneNumber) -> Option<Session> {
        self.sessions.remove(phone.as_str())
    }

    /// Number of stored sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Take every session out of the store.
    pub fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}
