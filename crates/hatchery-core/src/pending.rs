//! Process-wide index of launches awaiting their ready notification.

use crate::pool::Pool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use tracing::warn;

/// Maps each launched-but-not-yet-ready process identifier to the pool that
/// is expecting its ready notification.
///
/// A process identifier appears in at most one pool's pending set at a time,
/// and lookups are scoped strictly to currently pending entries - historical
/// identifiers never match. Entries hold weak references so a destroyed pool
/// cannot be revived through a stale index entry.
pub struct PendingIndex {
    entries: Mutex<HashMap<u32, Weak<Pool>>>,
}

impl PendingIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of pending entries across all pools.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// True when nothing is pending anywhere.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Register `pid` as pending for the pool behind `owner`.
    pub(crate) fn register(&self, pid: u32, owner: Weak<Pool>) {
        if self.entries.lock().unwrap().insert(pid, owner).is_some() {
            // The OS handed out an identifier that was never reconciled.
            warn!("PID {} re-registered while still pending", pid);
        }
    }

    /// Remove `pid` from the index. Returns true if it was present.
    pub(crate) fn remove(&self, pid: u32) -> bool {
        self.entries.lock().unwrap().remove(&pid).is_some()
    }

    /// Pool expecting a ready notification for `pid`, if any.
    pub(crate) fn owner_of(&self, pid: u32) -> Option<Arc<Pool>> {
        self.entries.lock().unwrap().get(&pid).and_then(Weak::upgrade)
    }

    /// Pending entries whose process is absent from `live`.
    ///
    /// Entries whose owning pool is gone are pruned on the way; they are
    /// orphans of an `unregister` that raced an in-flight launch.
    pub(crate) fn stale_against(&self, live: &HashSet<u32>) -> Vec<(u32, Arc<Pool>)> {
        let mut entries = self.entries.lock().unwrap();
        let mut stale = Vec::new();
        entries.retain(|pid, owner| match owner.upgrade() {
            None => false,
            Some(pool) => {
                if !live.contains(pid) {
                    stale.push((*pid, pool));
                }
                true
            }
        });
        stale
    }
}

impl Default for PendingIndex {
    fn default() -> Self {
        Self::new()
    }
}
