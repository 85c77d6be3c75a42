//! Session registry.
//!
//! Two disjoint tables (continuous and range sessions) share one id counter,
//! so an id names at most one session of either kind for the life of the
//! process. Lookups hand out a cloned `Arc`; no map guard is ever held while
//! a caller blocks on the engine.

use crate::error::BridgeError;
use crate::range::RangeSession;
use crate::session::SyncSession;
use chainsync_types::{SessionId, SessionKind};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One table of live sessions of a single kind.
pub struct SessionTable<S> {
    kind: SessionKind,
    sessions: DashMap<SessionId, Arc<S>>,
}

impl<S> SessionTable<S> {
    fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            sessions: DashMap::new(),
        }
    }

    /// Register a session under `id`.
    pub fn put(&self, id: SessionId, session: Arc<S>) {
        self.sessions.insert(id, session);
        debug!(kind = %self.kind, %id, live = self.sessions.len(), "session registered");
    }

    /// Look up a session.
    pub fn get(&self, id: SessionId) -> Option<Arc<S>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Like [`get`](Self::get), but a missing session is an error.
    pub fn require(&self, id: SessionId) -> Result<Arc<S>, BridgeError> {
        self.get(id)
            .ok_or(BridgeError::SessionNotFound(i64::from(id.value())))
    }

    /// Remove a session. Once this returns `Some`, no lookup finds it again.
    pub fn remove(&self, id: SessionId) -> Option<Arc<S>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() {
            debug!(kind = %self.kind, %id, live = self.sessions.len(), "session removed");
        }
        removed
    }

    /// Remove and return every session.
    pub fn drain(&self) -> Vec<Arc<S>> {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Every live session plus the id counter.
pub struct Registry {
    next_id: AtomicU32,
    /// Continuous sync sessions.
    pub continuous: SessionTable<SyncSession>,
    /// Range sync sessions.
    pub range: SessionTable<RangeSession>,
}

impl Registry {
    /// Create an empty registry. The first id issued is 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            continuous: SessionTable::new(SessionKind::Continuous),
            range: SessionTable::new(SessionKind::Range),
        }
    }

    /// Issue a fresh id.
    ///
    /// Ids must fit the signed 32-bit id of the C surface; once the counter
    /// passes that range no more sessions can be created.
    pub fn allocate(&self) -> Result<SessionId, BridgeError> {
        let ceiling = i32::MAX.unsigned_abs();
        let raw = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next <= ceiling).then_some(next + 1)
            })
            .map_err(|_| BridgeError::General("session ids exhausted".to_string()))?;
        SessionId::new(raw)
            .ok_or_else(|| BridgeError::General("session ids exhausted".to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
