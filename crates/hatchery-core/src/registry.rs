//! Process-wide registry of pools keyed by launch command.

use crate::pool::Pool;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Command -> pool map. A command has at most one pool at a time.
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, Arc<Pool>>>,
}

impl PoolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Pool registered for `command`, if any.
    pub fn get(&self, command: &str) -> Option<Arc<Pool>> {
        self.pools.lock().unwrap().get(command).cloned()
    }

    /// Insert `pool` unless its command is already registered.
    pub(crate) fn insert(&self, pool: Arc<Pool>) -> bool {
        let mut pools = self.pools.lock().unwrap();
        match pools.entry(pool.command().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(pool);
                true
            }
        }
    }

    /// Remove and return the pool for `command`.
    pub(crate) fn remove(&self, command: &str) -> Option<Arc<Pool>> {
        self.pools.lock().unwrap().remove(command)
    }

    /// Take every registered pool, leaving the registry empty.
    pub(crate) fn drain(&self) -> Vec<Arc<Pool>> {
        self.pools.lock().unwrap().drain().map(|(_, p)| p).collect()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
