//! Periodic reconciliation of pending launches against the OS process table.

use crate::config::PoolConfig;
use crate::pending::PendingIndex;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Read-only view of the live OS process table.
///
/// A query failure is "no information": the reconciler skips that tick
/// without evicting anything.
pub trait ProcessTable: Send + Sync {
    /// Identifiers of every currently live process, or `None` when the
    /// table cannot be queried.
    fn live_pids(&self) -> Option<HashSet<u32>>;
}

/// Process table backed by sysinfo.
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl SysinfoProcessTable {
    /// Create a table with an empty sysinfo snapshot; each query refreshes
    /// the process list.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn live_pids(&self) -> Option<HashSet<u32>> {
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new(),
        );
        Some(system.processes().keys().map(|pid| pid.as_u32()).collect())
    }
}

/// Garbage collector for pending entries whose process died before its ready
/// notification arrived.
///
/// Process identifiers are reused by the OS. Without reconciliation, a
/// pending entry whose process exited early could later be matched against
/// an unrelated process that happens to reuse the same identifier, and that
/// process's resource would be wrongly hidden and captured into the pool.
/// The reconciler bounds that window: while anything is pending it ticks
/// periodically, evicting entries whose identifier is absent from the live
/// process set; it disarms itself when the pending count reaches zero and is
/// rearmed by the next launch.
pub struct Reconciler {
    pending: Arc<PendingIndex>,
    table: Arc<dyn ProcessTable>,
    state: Mutex<ReconcilerState>,
}

struct ReconcilerState {
    enabled: bool,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl Reconciler {
    pub(crate) fn new(pending: Arc<PendingIndex>, table: Arc<dyn ProcessTable>) -> Arc<Self> {
        Arc::new(Self {
            pending,
            table,
            state: Mutex::new(ReconcilerState {
                enabled: false,
                interval: PoolConfig::RECONCILE_INTERVAL,
                task: None,
            }),
        })
    }

    /// Turn the reconciler on with the given tick interval, arming it
    /// immediately if launches are already pending.
    pub fn enable(self: &Arc<Self>, interval: Duration) {
        {
            let mut state = self.state.lock().unwrap();
            state.enabled = true;
            state.interval = interval;
        }
        if !self.pending.is_empty() {
            self.arm();
        }
    }

    /// Called after every launch registration; rearms a disarmed reconciler.
    pub(crate) fn notify_launched(self: &Arc<Self>) {
        self.arm();
    }

    fn arm(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        if !state.enabled || state.task.is_some() {
            return;
        }
        let this = Arc::clone(self);
        let interval = state.interval;
        state.task = Some(tokio::spawn(async move {
            this.run(interval).await;
        }));
        debug!("Reconciler armed (interval {:?})", interval);
    }

    async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // A tokio interval fires immediately; the first reconcile should
        // wait a full period after the launch that armed us.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.reconcile_once();

            // Disarm when nothing is left pending. The pending count is
            // re-read under the state lock: a launch that registered between
            // the tick and here must keep the timer running. The guard is
            // scoped so it is never held across an await.
            let disarm = {
                let mut state = self.state.lock().unwrap();
                if self.pending.is_empty() {
                    state.task = None;
                    true
                } else {
                    false
                }
            };
            if disarm {
                debug!("Reconciler disarmed: no pending launches");
                return;
            }
        }
    }

    /// One reconcile pass: enumerate live PIDs once and evict every pending
    /// entry whose process is gone. Nothing is killed - the processes being
    /// evicted already exited.
    pub(crate) fn reconcile_once(&self) {
        if self.pending.is_empty() {
            return;
        }
        let Some(live) = self.table.live_pids() else {
            warn!("Process table query failed, skipping reconcile tick");
            return;
        };
        for (pid, pool) in self.pending.stale_against(&live) {
            pool.evict_pending(pid);
        }
    }
}
