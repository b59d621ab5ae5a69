//! Module `group`
//!
//! A named room: a set of registered sessions behind the group's own lock.
//! The hub always takes this lock after any hub-wide lock, never before.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::session::{Session, SessionId};

pub struct Group {
    name: String,
    members: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a member. Returns false if it was already present.
    pub fn add(&self, session: Arc<Session>) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members.insert(session.id(), session).is_none()
    }

    /// Removes a member. Returns false if it was not present.
    pub fn remove(&self, id: &SessionId) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members.remove(id).is_some()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Display names of the current members, sorted.
    pub fn snapshot_members(&self) -> Vec<String> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members
            .values()
            .map(|s| s.name().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Current member handles, captured under the lock.
    pub fn members(&self) -> Vec<Arc<Session>> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.values().cloned().collect()
    }
}
