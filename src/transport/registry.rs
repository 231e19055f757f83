//! Process-wide session registry.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::session::SessionTransport;
use super::SessionId;

/// Concurrent map from session token to transport.
///
/// Every mutation is a single map operation; nothing here awaits.
pub struct SessionRegistry<T: ?Sized = SessionTransport> {
    sessions: DashMap<SessionId, Arc<T>>,
}

impl<T: ?Sized> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert unless the token is already taken. Returns whether it was inserted.
    pub fn insert_if_absent(&self, id: SessionId, transport: Arc<T>) -> bool {
        match self.sessions.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(transport);
                true
            }
        }
    }

    /// Remove an entry. Only the first caller for a given token gets it back.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.remove(id).map(|(_, transport)| transport)
    }

    /// Point-in-time copy of all entries
    pub fn snapshot(&self) -> Vec<(SessionId, Arc<T>)> {
        self.sessions
            .iter()
            .map(|entry| (Arc::clone(entry.key()), Arc::clone(entry.value())))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<T: ?Sized> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for SessionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
