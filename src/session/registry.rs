//! Live-connection registry and observer relation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use super::link::Link;
use super::{SessionError, SessionId};

#[derive(Default)]
struct RegistryInner {
    next_id: u32,
    links: BTreeMap<SessionId, Arc<Link>>,
    /// target -> spectators
    observers: HashMap<SessionId, BTreeSet<SessionId>>,
}

/// Set of live connections, keyed by session id in arrival order.
pub struct Registry {
    inner: Mutex<RegistryInner>,
    max_sessions: usize,
}

impl Registry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 1, // 0 reserved
                ..Default::default()
            }),
            max_sessions,
        }
    }

    /// Allocates a session id unique for the life of the process.
    pub fn allocate_id(&self) -> Result<SessionId, SessionError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id = id.checked_add(1).ok_or(SessionError::IdOverflow)?;
        Ok(SessionId(id))
    }

    pub fn insert(&self, link: Arc<Link>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.links.len() >= self.max_sessions {
            return Err(SessionError::MaxSessionsExceeded {
                limit: self.max_sessions,
            });
        }
        inner.links.insert(link.session_id(), link);
        Ok(())
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Link>> {
        self.inner.lock().links.get(&id).cloned()
    }

    /// Removes `id` together with every observer edge touching it.
    pub fn remove(&self, id: SessionId) -> bool {
        let mut inner = self.inner.lock();
        inner.observers.remove(&id);
        for spectators in inner.observers.values_mut() {
            spectators.remove(&id);
        }
        inner.links.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_sessions
    }

    /// Live links in arrival order.
    pub fn links(&self) -> Vec<Arc<Link>> {
        self.inner.lock().links.values().cloned().collect()
    }

    /// Adds `observer` as a spectator of `target`. Fails if either is gone.
    pub fn attach_observer(&self, target: SessionId, observer: SessionId) -> bool {
        let mut inner = self.inner.lock();
        if target == observer || !inner.links.contains_key(&target) || !inner.links.contains_key(&observer) {
            return false;
        }
        inner.observers.entry(target).or_default().insert(observer);
        true
    }

    pub fn detach_observer(&self, target: SessionId, observer: SessionId) {
        let mut inner = self.inner.lock();
        if let Some(spectators) = inner.observers.get_mut(&target) {
            spectators.remove(&observer);
            if spectators.is_empty() {
                inner.observers.remove(&target);
            }
        }
    }

    pub fn observer_ids(&self, target: SessionId) -> Vec<SessionId> {
        self.inner
            .lock()
            .observers
            .get(&target)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Links of everyone currently observing `target`.
    pub fn observers_of(&self, target: SessionId) -> Vec<Arc<Link>> {
        let inner = self.inner.lock();
        match inner.observers.get(&target) {
            Some(spectators) => spectators
                .iter()
                .filter_map(|id| inner.links.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}
