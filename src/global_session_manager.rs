use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::UserSession;

/// Per-browser sessions keyed by the id stored in the session cookie.
#[derive(Clone, Default)]
pub struct GlobalSessionManager {
    sessions: Arc<Mutex<HashMap<String, UserSession>>>,
}

impl GlobalSessionManager {
    pub fn new() -> Self {
        GlobalSessionManager::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserSession>> {
        // A panicked handler leaves the map itself intact.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts or updates a session
    pub fn insert(&self, session_id: String, session: UserSession) {
        self.lock().insert(session_id, session);
    }

    /// Retrieves a copy of the session if it exists
    pub fn get(&self, session_id: &str) -> Option<UserSession> {
        self.lock().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<UserSession> {
        self.lock().remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_isolated() {
        let manager = GlobalSessionManager::new();
        manager.insert("a".into(), UserSession::default());
        let mut b = UserSession::default();
        b.record_turn("hi", "hello");
        manager.insert("b".into(), b);

        assert_eq!(manager.len(), 2);
        assert!(manager.get("a").unwrap().history.is_empty());
        assert_eq!(manager.get("b").unwrap().history.len(), 2);
        assert!(manager.remove("a").is_some());
        assert!(manager.get("a").is_none());
    }
}
