//! Centralized configuration constants for pool behavior.

use std::time::Duration;

/// Pool behavior configuration.
pub struct PoolConfig;

impl PoolConfig {
    /// Warm slots kept per registered command unless a capacity is given.
    pub const DEFAULT_CAPACITY: usize = 1;

    /// Default tick interval for the pending-launch reconciler.
    pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

    /// Grace period between the graceful and forced kill when tearing down
    /// pooled processes.
    pub const KILL_TIMEOUT: Duration = Duration::from_millis(2000);
}
