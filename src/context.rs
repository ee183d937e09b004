//! Assembly and teardown of the engine's process-wide state.
//!
//! [`ContextBuilder`] wires the [`ResourceLock`], the UI loop thread, the
//! [`TaskScheduler`], the [`PropertyRegistry`], the [`PropertyEngine`] and the
//! [`IntrefTable`] into one [`AppContext`]. Nothing here is global: embedders
//! own the context and end it with [`AppContext::shutdown`].
//!
//! ## Example
//! ```ignore
//! let store = Arc::new(MemoryNodeStore::new("fs"));
//! let ctx = ContextBuilder::new("fs")?
//!     .store(store.clone())
//!     .build()?;
//! let task = ctx.engine().refresh(&store.insert("/tmp/a"), "size");
//! task.completed().await?;
//! ctx.shutdown();
//! ```
//!
//! Default components: [`MemoryNodeStore`] for the node store and
//! [`ShellRunner`] for subprocesses. `build` needs a tokio runtime, either
//! the current one or one set with [`ContextBuilder::runtime`].

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::BatchCollector;
use crate::EngineConfig;
use crate::Error;
use crate::ExternalTaskQueue;
use crate::IntrefError;
use crate::IntrefTable;
use crate::MemoryNodeStore;
use crate::NodePropertyStore;
use crate::PendingRequestTable;
use crate::PropertyEngine;
use crate::PropertyError;
use crate::PropertyRegistry;
use crate::RefreshContext;
use crate::ResourceLock;
use crate::Result;
use crate::ShellRunner;
use crate::SubprocessRunner;
use crate::Task;
use crate::TaskScheduler;
use crate::UiLoop;

pub struct ContextBuilder {
    domain: String,
    config: EngineConfig,
    store: Option<Arc<dyn NodePropertyStore>>,
    runner: Option<Arc<dyn SubprocessRunner>>,
    external: Option<Arc<dyn ExternalTaskQueue>>,
    handle: Option<Handle>,
}

impl ContextBuilder {
    /// Builder over the layered configuration (defaults, `CONFIG_PATH`,
    /// `PROPS__*` environment variables).
    pub fn new(domain: impl Into<String>) -> Result<Self> {
        Ok(Self::from_config(domain, EngineConfig::new()?))
    }

    pub fn from_config(
        domain: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            domain: domain.into(),
            config,
            store: None,
            runner: None,
            external: None,
            handle: None,
        }
    }

    /// Sets the store nodes are read from and values written to
    pub fn store(
        mut self,
        store: Arc<dyn NodePropertyStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets how refresh commands are started
    pub fn runner(
        mut self,
        runner: Arc<dyn SubprocessRunner>,
    ) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Sets the queue receiving external-visibility tasks
    pub fn external_queue(
        mut self,
        queue: Arc<dyn ExternalTaskQueue>,
    ) -> Self {
        self.external = Some(queue);
        self
    }

    /// Sets the runtime running timers and subprocess I/O
    pub fn runtime(
        mut self,
        handle: Handle,
    ) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Validates the configuration, starts the UI loop and the worker pool
    /// and loads the property definitions.
    pub fn build(self) -> Result<AppContext> {
        let config = self.config.validate()?;
        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| Error::Fatal(format!("no tokio runtime: {e}")))?,
        };

        let lock = Arc::new(ResourceLock::new());
        let (ui, ui_runner) = UiLoop::new();
        let ui_thread = ui_runner.spawn()?;
        let scheduler = TaskScheduler::new(&config.scheduler, ui, self.external)?;

        let (registry, rejected) =
            PropertyRegistry::load(self.domain.as_str(), lock.clone(), &config.properties, &config.groups);
        let registry = Arc::new(registry);

        let (store, memory_store) = match self.store {
            Some(store) => (store, None),
            None => {
                let memory = Arc::new(MemoryNodeStore::new(self.domain.as_str()));
                (memory.clone() as Arc<dyn NodePropertyStore>, Some(memory))
            }
        };
        let refresh = Arc::new(RefreshContext {
            store: store.clone(),
            table: Arc::new(PendingRequestTable::new()),
            scheduler: scheduler.clone(),
            runner: self.runner.unwrap_or_else(|| Arc::new(ShellRunner)),
            read_chunk_size: config.batch.read_chunk_size,
        });
        let collector = BatchCollector::new(&config.batch, lock.clone(), refresh.clone(), handle.clone());
        let engine = PropertyEngine::new(registry.clone(), lock.clone(), collector, refresh);

        let intrefs = Arc::new(IntrefTable::new(config.intref.idle_timeout()));
        let shutdown = CancellationToken::new();
        spawn_intref_sweeper(&handle, intrefs.clone(), &config, shutdown.clone());

        info!(
            domain = %self.domain,
            properties = registry.snapshot().len(),
            rejected = rejected.len(),
            pool_size = config.scheduler.pool_size,
            "application context ready"
        );

        Ok(AppContext {
            domain: self.domain,
            config,
            lock,
            scheduler,
            registry,
            engine,
            intrefs,
            store,
            memory_store,
            rejected,
            ui_thread: Mutex::new(Some(ui_thread)),
            shutdown,
        })
    }
}

fn spawn_intref_sweeper(
    handle: &Handle,
    intrefs: Arc<IntrefTable>,
    config: &EngineConfig,
    shutdown: CancellationToken,
) {
    let period = config.intref.sweep_interval();
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("intref sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    intrefs.sweep();
                }
            }
        }
    });
}

/// The engine's process-wide state
pub struct AppContext {
    domain: String,
    config: EngineConfig,
    lock: Arc<ResourceLock>,
    scheduler: TaskScheduler,
    registry: Arc<PropertyRegistry>,
    engine: Arc<PropertyEngine>,
    intrefs: Arc<IntrefTable>,
    store: Arc<dyn NodePropertyStore>,
    memory_store: Option<Arc<MemoryNodeStore>>,
    rejected: Vec<PropertyError>,
    ui_thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl AppContext {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lock(&self) -> &Arc<ResourceLock> {
        &self.lock
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<PropertyEngine> {
        &self.engine
    }

    pub fn intrefs(&self) -> &Arc<IntrefTable> {
        &self.intrefs
    }

    pub fn store(&self) -> &Arc<dyn NodePropertyStore> {
        &self.store
    }

    /// The default store, when none was supplied to the builder
    pub fn memory_store(&self) -> Option<&Arc<MemoryNodeStore>> {
        self.memory_store.as_ref()
    }

    /// Definitions rejected when the context was built
    pub fn rejected(&self) -> &[PropertyError] {
        &self.rejected
    }

    /// Replaces the property definitions with those of `config`.
    pub fn reload(
        &self,
        config: &EngineConfig,
    ) -> Vec<PropertyError> {
        self.registry.reload(&config.properties, &config.groups)
    }

    /// Opaque handle of `task`, redeemable with [`AppContext::cancel_by_ref`]
    pub fn task_ref(
        &self,
        task: &Arc<Task>,
    ) -> String {
        self.intrefs.register(task.clone())
    }

    /// Cancels the task behind `id`. Returns `false` if it was already over.
    pub fn cancel_by_ref(
        &self,
        id: &str,
    ) -> std::result::Result<bool, IntrefError> {
        let task: Arc<Task> = self.intrefs.redeem(id)?;
        self.intrefs.remove(id);
        Ok(task.cancel())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Fails queued requests, stops the sweeper, the worker pool and the UI
    /// loop. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();

        let abandoned = self.engine.collector().abandon();
        self.scheduler.shutdown();

        if let Some(ui_thread) = self.ui_thread.lock().take() {
            if self.scheduler.ui().is_ui_thread() {
                warn!("shutdown called on the UI loop thread, not joining it");
            } else if ui_thread.join().is_err() {
                warn!("UI loop thread panicked");
            }
        }
        info!(domain = %self.domain, abandoned, "application context shut down");
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
