//! Per-command pool of pre-launched processes.

use crate::error::Result;
use crate::launcher::{Launcher, SpawnOptions};
use crate::pending::PendingIndex;
use crate::reconciler::Reconciler;
use crate::resource::PoolResource;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

/// A warm slot: a hidden, ready-to-hand-off resource.
pub struct ReadySlot {
    /// Process identifier of the pooled resource.
    pub pid: u32,
    /// The resource handle captured from the ready notification.
    pub resource: Arc<dyn PoolResource>,
    /// Launch metadata recorded when the slot was launched.
    pub metadata: serde_json::Value,
    /// Visibility flag observed before the pool hid the resource.
    pub was_hidden: bool,
}

/// Pool status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// The registered command.
    pub command: String,
    /// Target number of warm slots.
    pub capacity: usize,
    /// Slots launched but not yet confirmed ready.
    pub pending: usize,
    /// Slots available for hand-off.
    pub ready: usize,
}

/// Warm pool for a single registered command.
///
/// Slots progress launched -> pending -> ready -> taken. Pending slots are
/// tracked in the process-wide [`PendingIndex`] until their ready
/// notification arrives; ready slots sit on a LIFO stack so `take` always
/// hands out the most recently warmed resource.
pub struct Pool {
    command: String,
    capacity: usize,
    launcher: Arc<dyn Launcher>,
    pending_index: Arc<PendingIndex>,
    reconciler: Arc<Reconciler>,
    /// Serializes refill passes so concurrent refills cannot overshoot
    /// capacity. Held only across synchronous launches, never across awaits.
    refill_guard: Mutex<()>,
    inner: Mutex<PoolInner>,
    weak_self: Weak<Pool>,
}

struct PoolInner {
    /// Launched but not yet ready: pid -> launch metadata.
    pending: HashMap<u32, serde_json::Value>,
    /// Ready slots, most recently readied last.
    ready: Vec<ReadySlot>,
    /// Set by `destroy`; late refill launches become orphans.
    destroyed: bool,
}

impl Pool {
    pub(crate) fn new(
        command: impl Into<String>,
        capacity: usize,
        launcher: Arc<dyn Launcher>,
        pending_index: Arc<PendingIndex>,
        reconciler: Arc<Reconciler>,
    ) -> Arc<Self> {
        // The pool registers itself as the owner of pending PIDs, so it
        // needs a handle on its own allocation.
        Arc::new_cyclic(|weak| Self {
            command: command.into(),
            capacity,
            launcher,
            pending_index,
            reconciler,
            refill_guard: Mutex::new(()),
            inner: Mutex::new(PoolInner {
                pending: HashMap::new(),
                ready: Vec::new(),
                destroyed: false,
            }),
            weak_self: weak.clone(),
        })
    }

    /// The command this pool serves.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Target number of warm slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current status snapshot.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().unwrap();
        PoolStats {
            command: self.command.clone(),
            capacity: self.capacity,
            pending: inner.pending.len(),
            ready: inner.ready.len(),
        }
    }

    /// Launch processes until pending + ready covers the capacity.
    ///
    /// Launched slots stay pending until their ready notification arrives,
    /// which may be arbitrarily later. The first launch failure propagates
    /// and leaves the remaining deficit unfilled until the next refill
    /// attempt.
    pub fn request_refill(&self) -> Result<()> {
        let _guard = self.refill_guard.lock().unwrap();

        loop {
            let deficit = {
                let inner = self.inner.lock().unwrap();
                if inner.destroyed {
                    return Ok(());
                }
                self.capacity
                    .saturating_sub(inner.pending.len() + inner.ready.len())
            };
            if deficit == 0 {
                return Ok(());
            }

            // No pool lock is held across the launch, and refills triggered
            // from inside a launch are always deferred, so a launcher that
            // re-enters the router cannot recurse into this guard.
            let ticket = self.launcher.launch(&self.command, &SpawnOptions::default())?;

            {
                let mut inner = self.inner.lock().unwrap();
                if inner.destroyed {
                    // The launch raced destroy: abandon it. Its ready
                    // notification will find no owner and fall through to
                    // default handling.
                    debug!(
                        "Pool for {:?} destroyed mid-refill, orphaning PID {}",
                        self.command, ticket.pid
                    );
                    return Ok(());
                }
                inner.pending.insert(ticket.pid, ticket.metadata);
            }

            self.pending_index.register(ticket.pid, self.weak_self.clone());
            self.reconciler.notify_launched();
            debug!("Prelaunched {:?} as PID {}", self.command, ticket.pid);
        }
    }

    /// Defer a refill to the next runtime turn so the caller is never
    /// blocked by the refill's own launches.
    pub(crate) fn schedule_refill(&self) {
        let Some(pool) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = pool.request_refill() {
                warn!("Background refill for {:?} failed: {}", pool.command, e);
            }
        });
    }

    /// Move a pending slot to the ready stack.
    ///
    /// The resource is hidden and stripped of placement so it stays invisible
    /// until handed to a real caller; its prior visibility flag is recorded
    /// for restoration at take time. Returns false when the resource's PID is
    /// not pending here or the pool is destroyed - the caller must fall
    /// through to default handling.
    pub fn enqueue_ready(&self, resource: Arc<dyn PoolResource>) -> bool {
        let Some(pid) = resource.pid() else {
            return false;
        };

        let metadata = {
            let mut inner = self.inner.lock().unwrap();
            if inner.destroyed {
                return false;
            }
            match inner.pending.remove(&pid) {
                Some(meta) => meta,
                None => return false,
            }
        };
        self.pending_index.remove(pid);

        let was_hidden = resource.is_hidden();
        resource.set_hidden(true);
        resource.clear_placement();

        let mut inner = self.inner.lock().unwrap();
        if inner.destroyed {
            // destroy ran between the pending removal and here; hand the
            // resource back to default handling untouched.
            resource.set_hidden(was_hidden);
            return false;
        }
        inner.ready.push(ReadySlot {
            pid,
            resource,
            metadata,
            was_hidden,
        });
        debug!("PID {} ready in pool for {:?}", pid, self.command);
        true
    }

    /// Pop the most recently readied live slot.
    ///
    /// Candidates whose process died between readiness and now are discarded
    /// silently; the pool is merely under-filled until the next refill.
    pub fn take(&self) -> Option<ReadySlot> {
        let mut inner = self.inner.lock().unwrap();
        while let Some(slot) = inner.ready.pop() {
            if slot.resource.is_live() {
                debug!("Handing out warm PID {} for {:?}", slot.pid, self.command);
                return Some(slot);
            }
            debug!(
                "Discarding dead pooled PID {} for {:?}",
                slot.pid, self.command
            );
        }
        None
    }

    /// Drop a pending entry whose process died before reporting ready.
    ///
    /// Nothing is killed - there is nothing left to kill.
    pub(crate) fn evict_pending(&self, pid: u32) -> bool {
        let removed = self.inner.lock().unwrap().pending.remove(&pid).is_some();
        if removed {
            self.pending_index.remove(pid);
            debug!("Evicted stale pending PID {} for {:?}", pid, self.command);
        }
        removed
    }

    /// Tear the pool down: abandon pending launches and kill every ready
    /// resource. Idempotent; returns the number of resources killed.
    pub fn destroy(&self) -> usize {
        let (pending_pids, ready) = {
            let mut inner = self.inner.lock().unwrap();
            inner.destroyed = true;
            (
                inner.pending.drain().map(|(pid, _)| pid).collect::<Vec<_>>(),
                std::mem::take(&mut inner.ready),
            )
        };

        for pid in &pending_pids {
            self.pending_index.remove(*pid);
        }

        let killed = ready.len();
        for slot in ready {
            slot.resource.kill();
        }

        if killed > 0 || !pending_pids.is_empty() {
            info!(
                "Destroyed pool for {:?}: killed {} ready, abandoned {} pending",
                self.command,
                killed,
                pending_pids.len()
            );
        }
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HatcheryError;
    use crate::launcher::LaunchTicket;
    use crate::reconciler::ProcessTable;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

    struct FakeLauncher {
        next_pid: AtomicU32,
        launches: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeLauncher {
        fn new() -> Self {
            Self {
                next_pid: AtomicU32::new(100),
                launches: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, command: &str, options: &SpawnOptions) -> Result<LaunchTicket> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(HatcheryError::LaunchFailed {
                    command: command.to_string(),
                    message: "scripted failure".into(),
                });
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(LaunchTicket {
                pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
                metadata: options.metadata.clone(),
            })
        }
    }

    struct FakeResource {
        pid: u32,
        hidden: AtomicBool,
        live: AtomicBool,
        kills: AtomicUsize,
    }

    impl FakeResource {
        fn new(pid: u32) -> Self {
            Self {
                pid,
                hidden: AtomicBool::new(false),
                live: AtomicBool::new(true),
                kills: AtomicUsize::new(0),
            }
        }
    }

    impl PoolResource for FakeResource {
        fn pid(&self) -> Option<u32> {
            Some(self.pid)
        }
        fn is_hidden(&self) -> bool {
            self.hidden.load(Ordering::SeqCst)
        }
        fn set_hidden(&self, hidden: bool) {
            self.hidden.store(hidden, Ordering::SeqCst);
        }
        fn clear_placement(&self) {}
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
        fn kill(&self) {
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct EmptyTable;

    impl ProcessTable for EmptyTable {
        fn live_pids(&self) -> Option<HashSet<u32>> {
            Some(HashSet::new())
        }
    }

    fn test_pool(capacity: usize) -> (Arc<Pool>, Arc<FakeLauncher>, Arc<PendingIndex>) {
        let launcher = Arc::new(FakeLauncher::new());
        let pending = Arc::new(PendingIndex::new());
        let reconciler = Reconciler::new(Arc::clone(&pending), Arc::new(EmptyTable));
        let pool = Pool::new(
            "term",
            capacity,
            Arc::clone(&launcher) as Arc<dyn Launcher>,
            Arc::clone(&pending),
            reconciler,
        );
        (pool, launcher, pending)
    }

    #[test]
    fn test_refill_fills_to_capacity() {
        let (pool, launcher, pending) = test_pool(3);

        pool.request_refill().unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 3);
        assert_eq!(pool.stats().pending, 3);
        assert_eq!(pending.len(), 3);

        // Already full: a second pass launches nothing
        pool.request_refill().unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_refill_failure_leaves_deficit() {
        let (pool, launcher, _pending) = test_pool(2);
        launcher.fail.store(true, Ordering::SeqCst);

        assert!(pool.request_refill().is_err());
        assert_eq!(pool.stats().pending, 0);

        // Next attempt succeeds and fills the whole deficit
        launcher.fail.store(false, Ordering::SeqCst);
        pool.request_refill().unwrap();
        assert_eq!(pool.stats().pending, 2);
    }

    #[test]
    fn test_enqueue_moves_pending_to_ready() {
        let (pool, _launcher, pending) = test_pool(1);
        pool.request_refill().unwrap();

        let resource = Arc::new(FakeResource::new(100));
        assert!(pool.enqueue_ready(Arc::clone(&resource) as Arc<dyn PoolResource>));

        assert!(resource.is_hidden());
        assert_eq!(pool.stats().pending, 0);
        assert_eq!(pool.stats().ready, 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_enqueue_unknown_pid_rejected() {
        let (pool, _launcher, _pending) = test_pool(1);

        let resource = Arc::new(FakeResource::new(999));
        assert!(!pool.enqueue_ready(resource as Arc<dyn PoolResource>));
        assert_eq!(pool.stats().ready, 0);
    }

    #[test]
    fn test_take_is_lifo() {
        let (pool, _launcher, _pending) = test_pool(3);
        pool.request_refill().unwrap();

        for pid in [100, 101, 102] {
            let resource = Arc::new(FakeResource::new(pid));
            assert!(pool.enqueue_ready(resource as Arc<dyn PoolResource>));
        }

        assert_eq!(pool.take().unwrap().pid, 102);
        assert_eq!(pool.take().unwrap().pid, 101);
        assert_eq!(pool.take().unwrap().pid, 100);
        assert!(pool.take().is_none());
    }

    #[test]
    fn test_take_discards_dead_candidates() {
        let (pool, _launcher, _pending) = test_pool(2);
        pool.request_refill().unwrap();

        let older = Arc::new(FakeResource::new(100));
        let newer = Arc::new(FakeResource::new(101));
        assert!(pool.enqueue_ready(Arc::clone(&older) as Arc<dyn PoolResource>));
        assert!(pool.enqueue_ready(Arc::clone(&newer) as Arc<dyn PoolResource>));

        newer.live.store(false, Ordering::SeqCst);

        let slot = pool.take().unwrap();
        assert_eq!(slot.pid, 100);
        assert_eq!(pool.stats().ready, 0);
    }

    #[test]
    fn test_taken_slot_cannot_reappear() {
        let (pool, _launcher, pending) = test_pool(1);
        pool.request_refill().unwrap();

        let resource = Arc::new(FakeResource::new(100));
        assert!(pool.enqueue_ready(Arc::clone(&resource) as Arc<dyn PoolResource>));

        let slot = pool.take().unwrap();
        assert_eq!(slot.pid, 100);

        // Once taken, the slot is gone from both the pool and the index
        assert!(pending.is_empty());
        assert!(pool.take().is_none());
        assert!(!pool.enqueue_ready(Arc::clone(&resource) as Arc<dyn PoolResource>));
    }

    #[test]
    fn test_capacity_invariant_after_each_operation() {
        let (pool, _launcher, _pending) = test_pool(2);

        let within_capacity = |pool: &Pool| {
            let stats = pool.stats();
            stats.pending + stats.ready <= stats.capacity
        };

        pool.request_refill().unwrap();
        assert!(within_capacity(&pool));

        let resource = Arc::new(FakeResource::new(100));
        pool.enqueue_ready(resource as Arc<dyn PoolResource>);
        assert!(within_capacity(&pool));

        pool.take();
        assert!(within_capacity(&pool));

        pool.request_refill().unwrap();
        assert!(within_capacity(&pool));
    }

    #[test]
    fn test_destroy_kills_ready_and_abandons_pending() {
        let (pool, _launcher, pending) = test_pool(3);
        pool.request_refill().unwrap();

        let ready = Arc::new(FakeResource::new(100));
        assert!(pool.enqueue_ready(Arc::clone(&ready) as Arc<dyn PoolResource>));

        let killed = pool.destroy();
        assert_eq!(killed, 1);
        assert_eq!(ready.kills.load(Ordering::SeqCst), 1);
        assert!(pending.is_empty());

        // Idempotent
        assert_eq!(pool.destroy(), 0);
    }

    #[test]
    fn test_refill_after_destroy_is_a_noop() {
        let (pool, launcher, pending) = test_pool(2);
        pool.destroy();

        pool.request_refill().unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_enqueue_after_destroy_rejected() {
        let (pool, _launcher, _pending) = test_pool(1);
        pool.request_refill().unwrap();
        pool.destroy();

        let resource = Arc::new(FakeResource::new(100));
        assert!(!pool.enqueue_ready(Arc::clone(&resource) as Arc<dyn PoolResource>));
        assert!(!resource.is_hidden());
    }

    #[test]
    fn test_evict_pending() {
        let (pool, _launcher, pending) = test_pool(2);
        pool.request_refill().unwrap();

        assert!(pool.evict_pending(100));
        assert!(!pool.evict_pending(100));
        assert_eq!(pool.stats().pending, 1);
        assert_eq!(pending.len(), 1);
    }
}
