//! vCode → session map, the single source of truth for active codes.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::code::VCode;
use super::error::{BrokerError, BrokerResult};
use super::types::{ConnectionId, Session, SessionState};

/// Whether a session survives an in-place update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Keep,
    Remove,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RegistryStats {
    pub pending: usize,
    pub paired: usize,
}

impl RegistryStats {
    pub fn total(&self) -> usize {
        self.pending + self.paired
    }
}

/// Holds every Pending or Paired session.
///
/// Operations on one code are serialized by the map's entry lock. Codes in
/// different shards never contend, so there is no registry-wide lock.
pub struct CodeRegistry {
    /// vcode -> session
    sessions: DashMap<VCode, Session>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Create a Pending session for an unused code
    pub fn register(
        &self,
        vcode: VCode,
        sender: ConnectionId,
        now: DateTime<Utc>,
    ) -> BrokerResult<Session> {
        self.register_with(vcode, sender, now, |_| Ok(()))
    }

    /// Like [`register`](Self::register), but runs `admit` while the code is
    /// still locked. If `admit` fails nothing is inserted.
    ///
    /// `admit` must not touch the registry.
    pub fn register_with<F>(
        &self,
        vcode: VCode,
        sender: ConnectionId,
        now: DateTime<Utc>,
        admit: F,
    ) -> BrokerResult<Session>
    where
        F: FnOnce(&Session) -> BrokerResult<()>,
    {
        match self.sessions.entry(vcode) {
            Entry::Occupied(entry) => Err(BrokerError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let session = Session::pending(entry.key().clone(), sender, now);
                admit(&session)?;
                entry.insert(session.clone());
                Ok(session)
            }
        }
    }

    pub fn lookup(&self, vcode: &VCode) -> BrokerResult<Session> {
        self.sessions
            .get(vcode)
            .map(|s| s.value().clone())
            .ok_or_else(|| BrokerError::NoSuchCode(vcode.clone()))
    }

    pub fn contains(&self, vcode: &VCode) -> bool {
        self.sessions.contains_key(vcode)
    }

    /// Idempotent
    pub fn remove(&self, vcode: &VCode) -> Option<Session> {
        self.sessions.remove(vcode).map(|(_, session)| session)
    }

    /// Run `f` against the session while its code is locked.
    ///
    /// On `Err` the session is left in the registry, so `f` must validate
    /// before it mutates. `f` must not touch the registry.
    pub fn update<R, F>(&self, vcode: &VCode, f: F) -> BrokerResult<R>
    where
        F: FnOnce(&mut Session) -> BrokerResult<(R, Retention)>,
    {
        match self.sessions.entry(vcode.clone()) {
            Entry::Vacant(_) => Err(BrokerError::NoSuchCode(vcode.clone())),
            Entry::Occupied(mut entry) => {
                let (out, retention) = f(entry.get_mut())?;
                if retention == Retention::Remove {
                    entry.remove();
                }
                Ok(out)
            }
        }
    }

    /// Remove every session for which `evict` returns true and return them.
    ///
    /// `evict` runs under the shard lock of the session it inspects.
    pub fn sweep<F>(&self, mut evict: F) -> Vec<Session>
    where
        F: FnMut(&Session) -> bool,
    {
        let mut removed = Vec::new();
        self.sessions.retain(|_, session| {
            if evict(session) {
                removed.push(session.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.sessions.iter() {
            match entry.value().state {
                SessionState::Pending => stats.pending += 1,
                SessionState::Paired => stats.paired += 1,
                SessionState::Closed => {}
            }
        }
        stats
    }
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
