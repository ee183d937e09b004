use std::sync::Arc;
use std::sync::Weak;

use tracing::debug;
use tracing::trace;

use crate::BatchCollector;
use crate::BatchItem;
use crate::DemuxMode;
use crate::LockMask;
use crate::NodeKey;
use crate::PropertyRegistry;
use crate::RefreshContext;
use crate::RefreshSession;
use crate::RegistryChange;
use crate::ResourceLock;
use crate::Task;
use crate::TaskError;
use crate::TaskOutcome;
use crate::TaskScheduler;
use crate::TaskStep;
use crate::TaskVisibility;

/// How a request reaches its subprocess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Joins the group's accumulating batch
    Batched,
    /// Gets a subprocess of its own, started at once
    Immediate,
}

/// Consumer entry point: turns property requests into tasks.
///
/// Every request task is resolved exactly once: DONE when its value was
/// stored, FAILED otherwise.
pub struct PropertyEngine {
    registry: Arc<PropertyRegistry>,
    lock: Arc<ResourceLock>,
    collector: Arc<BatchCollector>,
    ctx: Arc<RefreshContext>,
}

impl PropertyEngine {
    pub fn new(
        registry: Arc<PropertyRegistry>,
        lock: Arc<ResourceLock>,
        collector: Arc<BatchCollector>,
        ctx: Arc<RefreshContext>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            registry,
            lock,
            collector,
            ctx,
        });

        let weak = Arc::downgrade(&engine);
        engine.registry.subscribe(move |change| {
            if let Some(engine) = weak.upgrade() {
                engine.on_registry_change(change);
            }
        });
        engine
    }

    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.ctx.scheduler
    }

    pub fn collector(&self) -> &Arc<BatchCollector> {
        &self.collector
    }

    /// Builds the task for one request without starting it.
    ///
    /// `visibility` is where the request is queued and where its completion
    /// is observed.
    pub fn request(
        self: &Arc<Self>,
        node: &NodeKey,
        property: &str,
        visibility: TaskVisibility,
        mode: RefreshMode,
    ) -> Arc<Task> {
        let weak = Arc::downgrade(self);
        let (body_node, body_property) = (node.clone(), property.to_string());
        let task = Task::new(format!("refresh {property} of {node}"), visibility, move |task| {
            let Some(engine) = weak.upgrade() else {
                return TaskStep::Finished(Err(TaskError::ShutDown));
            };
            match engine.enqueue(task, &body_node, &body_property, mode) {
                Ok(()) => TaskStep::Deferred,
                Err(e) => TaskStep::Finished(Err(e)),
            }
        });

        let weak = Arc::downgrade(self);
        let (node, property) = (node.clone(), property.to_string());
        task.set_prerun(move |task, scheduler| {
            match weak.upgrade() {
                Some(engine) => match engine.check(&node, &property) {
                    Ok(()) => scheduler.run(task),
                    Err(e) => {
                        debug!(task = %task.id(), "request rejected: {}", e);
                        scheduler.deliver(&task, Err(e));
                    }
                },
                None => scheduler.deliver(&task, Err(TaskError::ShutDown)),
            }
        });
        task
    }

    /// Requests `property` of `node` through the batch of its group.
    pub fn refresh(
        self: &Arc<Self>,
        node: &NodeKey,
        property: &str,
    ) -> Arc<Task> {
        let task = self.request(node, property, TaskVisibility::Background, RefreshMode::Batched);
        self.ctx.scheduler.run(task.clone());
        task
    }

    /// Refreshes `property` of `node` with a subprocess of its own.
    pub fn refresh_now(
        self: &Arc<Self>,
        node: &NodeKey,
        property: &str,
    ) -> Arc<Task> {
        let task = self.request(node, property, TaskVisibility::Background, RefreshMode::Immediate);
        self.ctx.scheduler.run(task.clone());
        task
    }

    /// Refreshes `property` of `node` and blocks until it is resolved.
    ///
    /// Refused on the UI loop thread. Cancelling `calling_task` meanwhile
    /// cancels the request.
    pub fn refresh_blocking(
        self: &Arc<Self>,
        node: &NodeKey,
        property: &str,
        calling_task: Option<&Arc<Task>>,
    ) -> TaskOutcome {
        let task = self.request(node, property, TaskVisibility::Background, RefreshMode::Batched);
        self.ctx.scheduler.run_and_wait(task, calling_task)
    }

    /// Requests every preload property of `node`.
    pub fn preload(
        self: &Arc<Self>,
        node: &NodeKey,
    ) -> Vec<Arc<Task>> {
        self.registry
            .preload_properties()
            .iter()
            .map(|def| self.refresh(node, &def.name))
            .collect()
    }

    /// Fails fast before the request is queued anywhere.
    fn check(
        &self,
        node: &NodeKey,
        property: &str,
    ) -> std::result::Result<(), TaskError> {
        if self.registry.lookup(property).is_none() {
            return Err(TaskError::UnknownProperty {
                property: property.to_string(),
                node: self.ctx.store.full_location(node),
            });
        }
        if self.ctx.store.location(node).is_none() {
            return Err(TaskError::NodeGone {
                node: self.ctx.store.full_location(node),
            });
        }
        Ok(())
    }

    fn enqueue(
        &self,
        task: &Arc<Task>,
        node: &NodeKey,
        property: &str,
        mode: RefreshMode,
    ) -> std::result::Result<(), TaskError> {
        let _registry = self.lock.lock(LockMask::REGISTRY_READ);

        let (def, group) = self.registry.lookup(property).ok_or_else(|| TaskError::UnknownProperty {
            property: property.to_string(),
            node: self.ctx.store.full_location(node),
        })?;
        let location = self.ctx.store.location(node).ok_or_else(|| TaskError::NodeGone {
            node: self.ctx.store.full_location(node),
        })?;

        let id = self.ctx.table.insert(task.clone(), node.clone(), def.name.clone());
        let table = Arc::downgrade(&self.ctx.table);
        task.on_cancel(move || {
            if let Some(table) = table.upgrade() {
                table.remove(id);
            }
        });

        match mode {
            RefreshMode::Batched => self.collector.enqueue(&group, node, &location, id),
            RefreshMode::Immediate => {
                let item = BatchItem {
                    node: node.clone(),
                    location,
                    requests: vec![id],
                };
                self.collector
                    .start_session(RefreshSession::new(group, vec![item], DemuxMode::Single));
            }
        }
        Ok(())
    }

    /// Runs with the registry held for write by the reload.
    fn on_registry_change(
        self: &Arc<Self>,
        change: &RegistryChange,
    ) {
        if change.removed.is_empty() {
            return;
        }
        match self.lock.try_lock(LockMask::REGISTRY_READ) {
            Some(_registry) => {
                self.flush_removed_groups();
            }
            None => {
                trace!("registry busy, deferring flush of removed groups");
                let weak: Weak<Self> = Arc::downgrade(self);
                self.ctx.scheduler.run_idle(move || {
                    if let Some(engine) = weak.upgrade() {
                        let _registry = engine.lock.lock(LockMask::REGISTRY_READ);
                        engine.flush_removed_groups();
                    }
                });
            }
        }
    }

    /// Pending batches of groups that no longer exist are flushed with the
    /// definition they were collected under.
    fn flush_removed_groups(&self) -> usize {
        let flushed = self.collector.flush_unless(|id| self.registry.group(id).is_some());
        if flushed > 0 {
            debug!(flushed, "flushed batches of removed groups");
        }
        flushed
    }
}
