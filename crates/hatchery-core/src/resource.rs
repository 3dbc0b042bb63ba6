//! Resource handles fed to the pool by the host's ready notifications.

use crate::config::PoolConfig;
use crate::platform;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// A managed resource as seen by the pool.
///
/// The host's "resource created" notification carries a handle with a
/// process identifier, a mutable visibility flag and mutable placement tags.
/// The pool only needs this narrow view, so hosts implement it over their own
/// handle type (a window, a terminal, a session).
pub trait PoolResource: Send + Sync {
    /// OS process identifier backing this resource, if known.
    fn pid(&self) -> Option<u32>;

    /// Current visibility flag.
    fn is_hidden(&self) -> bool;

    /// Set the visibility flag.
    fn set_hidden(&self, hidden: bool);

    /// Clear any workspace/tag assignment so a hidden resource cannot be
    /// surfaced by the host's placement rules.
    fn clear_placement(&self);

    /// Cheap liveness probe, consulted when the pool hands slots out.
    ///
    /// Called with the pool lock held: implementations must be non-blocking
    /// and must not call back into the pool.
    fn is_live(&self) -> bool;

    /// Forcibly terminate the underlying resource.
    fn kill(&self);
}

/// [`PoolResource`] backed by a bare OS process.
///
/// Suitable for hosts whose resources are plain processes without a richer
/// handle; liveness and termination go through the platform layer.
pub struct ProcessResource {
    pid: u32,
    hidden: AtomicBool,
    tags: Mutex<Vec<String>>,
}

impl ProcessResource {
    /// Create a handle for `pid`, initially visible and untagged.
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            hidden: AtomicBool::new(false),
            tags: Mutex::new(Vec::new()),
        }
    }

    /// Set the initial placement tags.
    pub fn with_tags(self, tags: Vec<String>) -> Self {
        *self.tags.lock().unwrap() = tags;
        self
    }

    /// Current placement tags.
    pub fn tags(&self) -> Vec<String> {
        self.tags.lock().unwrap().clone()
    }
}

impl PoolResource for ProcessResource {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }

    fn clear_placement(&self) {
        self.tags.lock().unwrap().clear();
    }

    fn is_live(&self) -> bool {
        platform::is_process_alive(self.pid)
    }

    fn kill(&self) {
        if let Err(e) = platform::terminate_process(self.pid, PoolConfig::KILL_TIMEOUT) {
            warn!("Failed to terminate pooled process {}: {}", self.pid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_live() {
        let resource = ProcessResource::new(std::process::id());
        assert!(resource.is_live());
    }

    #[test]
    fn test_nonexistent_process_is_dead() {
        let resource = ProcessResource::new(4_000_000_000);
        assert!(!resource.is_live());
    }

    #[test]
    fn test_visibility_flag() {
        let resource = ProcessResource::new(1);
        assert!(!resource.is_hidden());

        resource.set_hidden(true);
        assert!(resource.is_hidden());

        resource.set_hidden(false);
        assert!(!resource.is_hidden());
    }

    #[test]
    fn test_clear_placement() {
        let resource =
            ProcessResource::new(1).with_tags(vec!["scratch".to_string(), "2".to_string()]);
        assert_eq!(resource.tags().len(), 2);

        resource.clear_placement();
        assert!(resource.tags().is_empty());
    }
}
