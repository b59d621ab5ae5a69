//! Client registry
//!
//! Registered sessions indexed by identifier and by display name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::session::{Session, SessionId};

/// Registry for tracking registered sessions
#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<SessionId, Arc<Session>>,
    names: HashMap<String, SessionId>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session unless its id or display name is already taken.
    /// On conflict the session is handed back untouched.
    pub fn insert(&mut self, session: Session) -> Result<Arc<Session>, Session> {
        if self.clients.contains_key(&session.id()) || self.names.contains_key(session.name()) {
            return Err(session);
        }
        let session = Arc::new(session);
        self.names.insert(session.name().to_string(), session.id());
        self.clients.insert(session.id(), Arc::clone(&session));
        Ok(session)
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Arc<Session>> {
        let session = self.clients.remove(id)?;
        self.names.remove(session.name());
        Some(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Arc<Session>> {
        self.clients.get(id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Session>> {
        self.names.get(name).and_then(|id| self.clients.get(id))
    }

    /// Display names of every registered session, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.clients.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn session(name: &str) -> Session {
        let (tx, _rx) = mpsc::channel(1);
        Session::new(SessionId::new(), name, tx)
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let mut registry = ClientRegistry::new();
        let alice = registry.insert(session("alice")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&alice.id()).unwrap().name(), "alice");
        assert_eq!(registry.find_by_name("alice").unwrap().id(), alice.id());
        assert!(registry.find_by_name("bob").is_none());
    }

    #[test]
    fn test_duplicate_name_is_handed_back() {
        let mut registry = ClientRegistry::new();
        registry.insert(session("alice")).unwrap();

        let rejected = registry.insert(session("alice")).unwrap_err();
        assert_eq!(rejected.name(), "alice");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_frees_name() {
        let mut registry = ClientRegistry::new();
        let alice = registry.insert(session("alice")).unwrap();
        registry.insert(session("bob")).unwrap();
        assert_eq!(registry.names(), vec!["alice", "bob"]);

        assert!(registry.remove(&alice.id()).is_some());
        assert!(registry.remove(&alice.id()).is_none());
        assert!(registry.find_by_name("alice").is_none());
        assert!(registry.insert(session("alice")).is_ok());
    }
}
