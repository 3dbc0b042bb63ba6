//! Spawn routing: the single entry point for "launch command C".

use crate::error::Result;
use crate::launcher::{LaunchTicket, Launcher, SpawnOptions};
use crate::pending::PendingIndex;
use crate::pool::{Pool, PoolStats};
use crate::ready::ResourceSink;
use crate::reconciler::Reconciler;
use crate::registry::PoolRegistry;
use std::sync::Arc;
use tracing::{debug, info};

/// Routes spawn requests through a warm pool when one is registered for the
/// command, and forwards them to the launcher otherwise.
///
/// Routing is an explicit lookup with an explicit fallback: commands without
/// a pool see exactly the behavior they would see without the router, with
/// no added latency.
pub struct SpawnRouter {
    launcher: Arc<dyn Launcher>,
    sink: Arc<dyn ResourceSink>,
    registry: PoolRegistry,
    pending: Arc<PendingIndex>,
    reconciler: Arc<Reconciler>,
}

impl SpawnRouter {
    pub(crate) fn new(
        launcher: Arc<dyn Launcher>,
        sink: Arc<dyn ResourceSink>,
        pending: Arc<PendingIndex>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            launcher,
            sink,
            registry: PoolRegistry::new(),
            pending,
            reconciler,
        }
    }

    /// Launch `command`, preferring a warm pooled instance.
    ///
    /// Unregistered commands and startup-notification re-invocations pass
    /// through to the launcher unchanged. A warm hit restores the slot's
    /// recorded visibility flag, re-emits the ready notification the caller
    /// expects, schedules a deferred refill and returns the slot's original
    /// launch metadata. When the pool is empty or exhausted, a refill is
    /// scheduled and the launch falls back to the launcher; no warm resource
    /// is returned in that case.
    pub fn route_spawn(&self, command: &str, options: &SpawnOptions) -> Result<LaunchTicket> {
        let Some(pool) = self.registry.get(command) else {
            return self.launcher.launch(command, options);
        };

        // Startup-notification tokens mark a re-invocation the pool hand-off
        // path does not support.
        if options.startup_id.is_some() {
            return self.launcher.launch(command, options);
        }

        match pool.take() {
            Some(slot) => {
                slot.resource.set_hidden(slot.was_hidden);
                self.sink.deliver(&slot.resource);
                pool.schedule_refill();
                debug!("Served {:?} from pool (PID {})", command, slot.pid);
                Ok(LaunchTicket {
                    pid: slot.pid,
                    metadata: slot.metadata,
                })
            }
            None => {
                // Pool exhausted: top it back up in the background and pay
                // the cold start this once.
                pool.schedule_refill();
                self.launcher.launch(command, options)
            }
        }
    }

    /// Register `command` with a pool of `capacity` warm slots.
    ///
    /// The initial fill is deferred to the next runtime turn so registration
    /// returns promptly instead of blocking on `capacity` launches. Returns
    /// false when the command is already registered or the key is invalid.
    pub fn register_command(&self, command: &str, capacity: usize) -> bool {
        if command.trim().is_empty() || capacity == 0 {
            return false;
        }

        let pool = Pool::new(
            command,
            capacity,
            Arc::clone(&self.launcher),
            Arc::clone(&self.pending),
            Arc::clone(&self.reconciler),
        );
        if !self.registry.insert(Arc::clone(&pool)) {
            return false;
        }

        info!("Registered {:?} with {} warm slot(s)", command, capacity);
        pool.schedule_refill();
        true
    }

    /// Tear down the pool for `command`. Returns false when not registered.
    pub fn unregister_command(&self, command: &str) -> bool {
        match self.registry.remove(command) {
            Some(pool) => {
                pool.destroy();
                info!("Unregistered {:?}", command);
                true
            }
            None => false,
        }
    }

    /// Destroy every registered pool, killing unclaimed pooled processes.
    pub fn shutdown(&self) {
        for pool in self.registry.drain() {
            pool.destroy();
        }
    }

    /// Status snapshot for a registered command.
    pub fn pool_stats(&self, command: &str) -> Option<PoolStats> {
        self.registry.get(command).map(|pool| pool.stats())
    }
}
