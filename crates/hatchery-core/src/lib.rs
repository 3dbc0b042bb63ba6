//! Hatchery - warm pools of pre-launched processes.
//!
//! Registering a command keeps a small pool of already-running, hidden
//! instances of it. A spawn routed through the hatchery is served from the
//! pool when possible, skipping cold-start latency entirely; the pool then
//! refills itself in the background. Everything else - unregistered
//! commands, startup-notification re-invocations - passes through to the
//! launcher untouched.
//!
//! Pool state is purely in-memory: on shutdown every pool is destroyed and
//! any unclaimed pooled process is killed.
//!
//! # Example
//!
//! ```rust,ignore
//! use hatchery::{Hatchery, SpawnOptions};
//!
//! #[tokio::main]
//! async fn main() -> hatchery::Result<()> {
//!     let hatchery = Hatchery::builder().build();
//!     hatchery.register_command("alacritty", 2);
//!     hatchery.enable_reconciler_default();
//!
//!     // Later, on a spawn request:
//!     let ticket = hatchery.route_spawn("alacritty", &SpawnOptions::new())?;
//!     println!("serving PID {}", ticket.pid);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod launcher;
pub mod pending;
pub mod platform;
pub mod pool;
pub mod ready;
pub mod reconciler;
pub mod registry;
pub mod resource;

mod router;

// Re-export commonly used types
pub use config::PoolConfig;
pub use error::{HatcheryError, Result};
pub use launcher::{CommandLauncher, LaunchTicket, Launcher, SpawnOptions};
pub use pending::PendingIndex;
pub use pool::{Pool, PoolStats, ReadySlot};
pub use ready::{NoopSink, ReadyRouter, ResourceSink};
pub use reconciler::{ProcessTable, Reconciler, SysinfoProcessTable};
pub use registry::PoolRegistry;
pub use resource::{PoolResource, ProcessResource};
pub use router::SpawnRouter;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Main entry point wiring the spawn router, the ready-notification router
/// and the reconciler over shared process-wide state.
///
/// All methods must be called from within a Tokio runtime: deferred refills
/// and the reconciler run as spawned tasks.
pub struct Hatchery {
    router: Arc<SpawnRouter>,
    ready: ReadyRouter,
    reconciler: Arc<Reconciler>,
    pending: Arc<PendingIndex>,
}

impl Hatchery {
    /// Create a builder for `Hatchery`.
    pub fn builder() -> HatcheryBuilder {
        HatcheryBuilder::new()
    }

    /// Route a spawn request; see [`SpawnRouter::route_spawn`].
    pub fn route_spawn(&self, command: &str, options: &SpawnOptions) -> Result<LaunchTicket> {
        self.router.route_spawn(command, options)
    }

    /// Register `command` with `capacity` warm slots; see
    /// [`SpawnRouter::register_command`].
    pub fn register_command(&self, command: &str, capacity: usize) -> bool {
        self.router.register_command(command, capacity)
    }

    /// Register `command` with [`PoolConfig::DEFAULT_CAPACITY`] warm slots.
    pub fn register_command_default(&self, command: &str) -> bool {
        self.router
            .register_command(command, PoolConfig::DEFAULT_CAPACITY)
    }

    /// Tear down the pool for `command`; see
    /// [`SpawnRouter::unregister_command`].
    pub fn unregister_command(&self, command: &str) -> bool {
        self.router.unregister_command(command)
    }

    /// Feed a host "resource created" notification into the engine; see
    /// [`ReadyRouter::on_resource_created`].
    pub fn on_resource_created(&self, resource: Arc<dyn PoolResource>) {
        self.ready.on_resource_created(resource);
    }

    /// Turn on the pending-launch reconciler with the given tick interval.
    pub fn enable_reconciler(&self, interval: Duration) {
        self.reconciler.enable(interval);
    }

    /// Turn on the reconciler with [`PoolConfig::RECONCILE_INTERVAL`].
    pub fn enable_reconciler_default(&self) {
        self.enable_reconciler(PoolConfig::RECONCILE_INTERVAL);
    }

    /// Destroy every pool, killing unclaimed pooled processes.
    pub fn shutdown(&self) {
        self.router.shutdown();
    }

    /// Install a Ctrl-C handler that destroys all pools before exiting.
    ///
    /// The process-wide handler can only be installed once; a second call
    /// (or a competing handler elsewhere in the host) fails.
    pub fn install_shutdown_hook(&self) -> Result<()> {
        let router = Arc::clone(&self.router);
        ctrlc::set_handler(move || {
            info!("Shutdown signal received, destroying pools");
            router.shutdown();
            std::process::exit(130);
        })
        .map_err(|e| HatcheryError::Other(format!("Failed to install shutdown hook: {}", e)))
    }

    /// Status snapshot for a registered command.
    pub fn pool_stats(&self, command: &str) -> Option<PoolStats> {
        self.router.pool_stats(command)
    }

    /// Total pending launches across all pools.
    pub fn pending_total(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Hatchery {
    fn drop(&mut self) {
        // Best-effort: pooled processes must not outlive the engine unclaimed.
        self.router.shutdown();
    }
}

/// Builder for [`Hatchery`].
///
/// Every collaborator has a working default: a detached-process launcher, a
/// logging-only sink and a sysinfo-backed process table. Hosts override the
/// sink to wire their own default new-resource handling.
pub struct HatcheryBuilder {
    launcher: Option<Arc<dyn Launcher>>,
    sink: Option<Arc<dyn ResourceSink>>,
    table: Option<Arc<dyn ProcessTable>>,
}

impl HatcheryBuilder {
    fn new() -> Self {
        Self {
            launcher: None,
            sink: None,
            table: None,
        }
    }

    /// Replace the default [`CommandLauncher`].
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Wire the host's default new-resource handling.
    pub fn sink(mut self, sink: Arc<dyn ResourceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the sysinfo-backed process table used by the reconciler.
    pub fn process_table(mut self, table: Arc<dyn ProcessTable>) -> Self {
        self.table = Some(table);
        self
    }

    /// Assemble the engine.
    pub fn build(self) -> Hatchery {
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(CommandLauncher::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(NoopSink));
        let table = self
            .table
            .unwrap_or_else(|| Arc::new(SysinfoProcessTable::new()));

        let pending = Arc::new(PendingIndex::new());
        let reconciler = Reconciler::new(Arc::clone(&pending), table);
        let router = Arc::new(SpawnRouter::new(
            launcher,
            Arc::clone(&sink),
            Arc::clone(&pending),
            Arc::clone(&reconciler),
        ));
        let ready = ReadyRouter::new(Arc::clone(&pending), sink);

        Hatchery {
            router,
            ready,
            reconciler,
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_defaults() {
        let engine = Hatchery::builder().build();

        assert_eq!(engine.pending_total(), 0);
        assert!(engine.pool_stats("term").is_none());
    }

    #[tokio::test]
    async fn test_invalid_registrations() {
        let engine = Hatchery::builder().build();

        assert!(!engine.register_command("", 1));
        assert!(!engine.register_command("term", 0));
        assert!(!engine.unregister_command("term"));
    }
}
