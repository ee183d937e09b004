//! Accumulates refresh requests per property group and decides when a
//! group's batch is flushed into a [`RefreshSession`].
//!
//! The first request of a window arms a debounce timer. A request arriving
//! while the batch already holds `soft_cap` nodes replaces the timer with a
//! short overflow window; it still joins the batch, and so does the rest of
//! the burst arriving within that window.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use crate::BatchConfig;
use crate::BatchItem;
use crate::DemuxMode;
use crate::GroupId;
use crate::LockMask;
use crate::NodeKey;
use crate::PendingRequest;
use crate::PropertyGroup;
use crate::RefreshContext;
use crate::RefreshSession;
use crate::RequestId;
use crate::ResourceLock;
use crate::TaskError;

#[derive(Debug)]
enum FlushTrigger {
    Debounce(AbortHandle),
    Immediate(AbortHandle),
}

impl FlushTrigger {
    fn abort(self) {
        match self {
            FlushTrigger::Debounce(handle) | FlushTrigger::Immediate(handle) => handle.abort(),
        }
    }
}

#[derive(Debug)]
struct GroupBatch {
    group: Arc<PropertyGroup>,
    items: Vec<BatchItem>,
    trigger: Option<FlushTrigger>,
}

#[derive(Debug, Default)]
struct BatchState {
    groups: HashMap<GroupId, GroupBatch>,
}

/// Per-group accumulating batches.
///
/// Every access to the batches happens with the `BATCH` resource of the
/// shared [`ResourceLock`] held; the inner mutex is never contended.
///
/// Flush triggers take `BATCH` from a runtime worker. The wait is bounded by
/// the other critical sections, none of which awaits or spawns a process.
/// Finished sessions only touch the atomic in-flight count.
pub struct BatchCollector {
    lock: Arc<ResourceLock>,
    state: Mutex<BatchState>,
    in_flight: AtomicUsize,
    ctx: Arc<RefreshContext>,
    handle: Handle,
    debounce: Duration,
    overflow_window: Duration,
    soft_cap: usize,
}

impl BatchCollector {
    pub fn new(
        config: &BatchConfig,
        lock: Arc<ResourceLock>,
        ctx: Arc<RefreshContext>,
        handle: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            lock,
            state: Mutex::new(BatchState::default()),
            in_flight: AtomicUsize::new(0),
            ctx,
            handle,
            debounce: config.debounce(),
            overflow_window: config.overflow_window(),
            soft_cap: config.soft_cap,
        })
    }

    /// Adds `request` for `node` to the accumulating batch of `group`.
    pub fn enqueue(
        self: &Arc<Self>,
        group: &Arc<PropertyGroup>,
        node: &NodeKey,
        location: &str,
        request: RequestId,
    ) {
        let _batch = self.lock.lock(LockMask::BATCH);
        let mut state = self.state.lock();

        if let Some(stale) = state.groups.get(&group.id).filter(|b| b.group != *group).map(|b| b.group.id.clone()) {
            debug!(group = %stale, "group definition changed, flushing its batch");
            self.detach_and_start(&mut state, &stale);
        }

        let batch = state.groups.entry(group.id.clone()).or_insert_with(|| GroupBatch {
            group: group.clone(),
            items: Vec::new(),
            trigger: None,
        });

        // checked before insertion: the cap ends the waiting, not the growth
        let pending = batch.items.len();
        if pending >= self.soft_cap {
            if !matches!(batch.trigger, Some(FlushTrigger::Immediate(_))) {
                if let Some(trigger) = batch.trigger.take() {
                    trigger.abort();
                }
                debug!(group = %group.id, pending, "soft cap reached, closing the batch");
                batch.trigger = Some(FlushTrigger::Immediate(self.arm(group.id.clone(), self.overflow_window)));
            }
        } else if batch.trigger.is_none() {
            trace!(group = %group.id, "arming debounce timer");
            batch.trigger = Some(FlushTrigger::Debounce(self.arm(group.id.clone(), self.debounce)));
        }

        match batch.items.iter_mut().find(|i| i.node == *node) {
            Some(item) => item.requests.push(request),
            None => batch.items.push(BatchItem {
                node: node.clone(),
                location: location.to_string(),
                requests: vec![request],
            }),
        }
    }

    /// Flushes the batch of `group` right away.
    pub fn flush(
        self: &Arc<Self>,
        group: &GroupId,
    ) -> bool {
        let _batch = self.lock.lock(LockMask::BATCH);
        self.detach_and_start(&mut self.state.lock(), group)
    }

    /// Flushes every batch whose group `keep` rejects. The caller holds the
    /// registry for read.
    pub fn flush_unless<F>(
        self: &Arc<Self>,
        keep: F,
    ) -> usize
    where
        F: Fn(&GroupId) -> bool,
    {
        let _batch = self.lock.lock(LockMask::BATCH);
        let mut state = self.state.lock();
        let doomed: Vec<GroupId> = state.groups.keys().filter(|id| !keep(id)).cloned().collect();
        doomed.iter().filter(|id| self.detach_and_start(&mut state, id)).count()
    }

    /// Runs `session` outside of any batch, e.g. a single-node refresh.
    pub fn start_session(
        self: &Arc<Self>,
        session: RefreshSession,
    ) {
        let _batch = self.lock.lock(LockMask::BATCH);
        self.start(session);
    }

    /// Nodes waiting in the accumulating batch of `group`
    pub fn pending_nodes(
        &self,
        group: &GroupId,
    ) -> usize {
        let _batch = self.lock.lock(LockMask::BATCH);
        self.state.lock().groups.get(group).map_or(0, |b| b.items.len())
    }

    pub fn sessions_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Drops every accumulating batch, failing its requests with
    /// `ShutDown`. Sessions already in flight run to completion.
    ///
    /// Outcomes are delivered after `BATCH` is released, so completion
    /// callbacks may enqueue again.
    pub fn abandon(&self) -> usize {
        let abandoned: Vec<PendingRequest> = {
            let _batch = self.lock.lock(LockMask::BATCH);
            let batches: Vec<GroupBatch> = self.state.lock().groups.drain().map(|(_, b)| b).collect();
            batches
                .into_iter()
                .flat_map(|batch| {
                    if let Some(trigger) = batch.trigger {
                        trigger.abort();
                    }
                    batch.items
                })
                .flat_map(|item| item.requests)
                .filter_map(|id| self.ctx.table.take(id))
                .collect()
        };

        for request in &abandoned {
            self.ctx.scheduler.deliver(&request.task, Err(TaskError::ShutDown));
        }
        if !abandoned.is_empty() {
            debug!(failed = abandoned.len(), "abandoned queued requests");
        }
        abandoned.len()
    }

    fn arm(
        self: &Arc<Self>,
        group: GroupId,
        delay: Duration,
    ) -> AbortHandle {
        let collector = Arc::downgrade(self);
        self.handle
            .spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Some(collector) = collector.upgrade() {
                    collector.flush(&group);
                }
            })
            .abort_handle()
    }

    /// Transfers the pending list of `group` to a new session.
    fn detach_and_start(
        self: &Arc<Self>,
        state: &mut BatchState,
        group: &GroupId,
    ) -> bool {
        let Some(mut batch) = state.groups.remove(group) else {
            return false;
        };
        // the trigger may be the task running this flush; aborting it only
        // takes effect at its next await, of which there is none
        if let Some(trigger) = batch.trigger.take() {
            trigger.abort();
        }
        if batch.items.is_empty() {
            return false;
        }
        let session = RefreshSession::new(batch.group, batch.items, DemuxMode::Batch);
        self.start(session);
        true
    }

    #[instrument(skip_all, fields(nodes = session.items().len()))]
    fn start(
        self: &Arc<Self>,
        session: RefreshSession,
    ) {
        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(in_flight, "starting refresh session");

        let collector = Arc::downgrade(self);
        let ctx = self.ctx.clone();
        self.handle.spawn(async move {
            session.run(&ctx).await;
            if let Some(collector) = collector.upgrade() {
                collector.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
        });
    }
}
