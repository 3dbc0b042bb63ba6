//! Interception of the host's "resource created" notifications.

use crate::pending::PendingIndex;
use crate::resource::PoolResource;
use std::sync::Arc;
use tracing::debug;

/// Destination for resources the pool does not capture.
///
/// This is the host's default "make the resource visible and apply placement
/// rules" handling. It receives every non-intercepted resource unchanged,
/// and it is re-invoked at take time for warm slots so the caller of a
/// successful spawn sees the ready notification it expects.
pub trait ResourceSink: Send + Sync {
    /// Apply default handling to `resource`.
    fn deliver(&self, resource: &Arc<dyn PoolResource>);
}

/// Sink that only logs. For hosts that wire their default handling
/// elsewhere, and for tests.
pub struct NoopSink;

impl ResourceSink for NoopSink {
    fn deliver(&self, resource: &Arc<dyn PoolResource>) {
        debug!(
            "Delivering resource (PID {:?}) to default handling",
            resource.pid()
        );
    }
}

/// Routes "resource created" notifications either into the owning pool or to
/// the default sink.
pub struct ReadyRouter {
    pending: Arc<PendingIndex>,
    sink: Arc<dyn ResourceSink>,
}

impl ReadyRouter {
    pub(crate) fn new(pending: Arc<PendingIndex>, sink: Arc<dyn ResourceSink>) -> Self {
        Self { pending, sink }
    }

    /// Handle a newly created resource.
    ///
    /// Resources without a process identifier, resources arriving while
    /// nothing is pending, and resources whose identifier is not pending are
    /// forwarded to the sink unchanged. Everything else is captured into the
    /// owning pool instead; default handling is skipped entirely and
    /// deferred to take time.
    pub fn on_resource_created(&self, resource: Arc<dyn PoolResource>) {
        let Some(pid) = resource.pid() else {
            self.sink.deliver(&resource);
            return;
        };
        if self.pending.is_empty() {
            self.sink.deliver(&resource);
            return;
        }
        let Some(pool) = self.pending.owner_of(pid) else {
            self.sink.deliver(&resource);
            return;
        };
        if !pool.enqueue_ready(Arc::clone(&resource)) {
            // Lost a race with destroy or eviction; treat as unmanaged.
            self.sink.deliver(&resource);
        }
    }
}
