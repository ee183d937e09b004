use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::execute;
use super::Task;
use super::TaskOutcome;
use super::TaskVisibility;
use super::UiLoop;
use super::WorkerPool;
use crate::Result;
use crate::SchedulerConfig;
use crate::TaskError;

/// Out-of-process task manager receiving external-visibility tasks.
#[cfg_attr(test, automock)]
pub trait ExternalTaskQueue: Send + Sync {
    fn enqueue(
        &self,
        task: Arc<Task>,
    );
}

/// Dispatches tasks according to their visibility.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    pool: WorkerPool,
    ui: UiLoop,
    external: Option<Arc<dyn ExternalTaskQueue>>,
}

impl TaskScheduler {
    pub fn new(
        config: &SchedulerConfig,
        ui: UiLoop,
        external: Option<Arc<dyn ExternalTaskQueue>>,
    ) -> Result<Self> {
        let pool = WorkerPool::new(config.pool_size)?;
        Ok(Self {
            inner: Arc::new(SchedulerInner { pool, ui, external }),
        })
    }

    pub fn ui(&self) -> &UiLoop {
        &self.inner.ui
    }

    /// Starts `task`.
    ///
    /// A task carrying a prerun hook only has that hook invoked; the hook is
    /// responsible for calling `run` again. Inline tasks are over (or
    /// deferred) when this returns; every other visibility completes later.
    pub fn run(
        &self,
        task: Arc<Task>,
    ) {
        if task.state().is_terminal() {
            trace!(task = %task.id(), "not running a finished task");
            return;
        }

        if let Some(prerun) = task.take_prerun() {
            trace!(task = %task.id(), "running prerun hook");
            prerun(task, self);
            return;
        }

        match task.visibility() {
            TaskVisibility::Inline => execute(&task),
            TaskVisibility::Background => {
                if let Err(task) = self.inner.pool.submit(task) {
                    warn!(task = %task.id(), "worker pool is shut down");
                    task.complete(Err(TaskError::ShutDown));
                }
            }
            TaskVisibility::Ui => {
                let rejected = task.clone();
                if !self.inner.ui.post_task(task) {
                    warn!(task = %rejected.id(), "UI loop is gone");
                    rejected.complete(Err(TaskError::ShutDown));
                }
            }
            TaskVisibility::External => match &self.inner.external {
                Some(queue) => queue.enqueue(task),
                None => {
                    debug!(task = %task.id(), "no external queue, running in the worker pool");
                    task.set_visibility(TaskVisibility::Background);
                    self.run(task);
                }
            },
        }
    }

    /// Runs `task` and blocks the calling thread until it is over.
    ///
    /// Background tasks are demoted to inline first: the caller is already off
    /// the UI thread, no pool thread needs to be tied up. Cancelling
    /// `calling_task` while blocked cancels `task` as well.
    pub fn run_and_wait(
        &self,
        task: Arc<Task>,
        calling_task: Option<&Arc<Task>>,
    ) -> TaskOutcome {
        if self.inner.ui.is_ui_thread() {
            error!(task = %task.id(), "run_and_wait called from the UI thread");
            return Err(TaskError::CalledFromUiThread);
        }

        if task.visibility() == TaskVisibility::Background {
            task.set_visibility(TaskVisibility::Inline);
        }

        let hook = calling_task.and_then(|calling_task| {
            let awaited = Arc::downgrade(&task);
            calling_task.on_cancel(move || {
                if let Some(awaited) = awaited.upgrade() {
                    awaited.cancel();
                }
            })
        });

        self.run(task.clone());
        let outcome = task.wait();
        if let (Some(calling_task), Some(hook)) = (calling_task, hook) {
            calling_task.remove_cancel_hook(hook);
        }
        outcome
    }

    /// Low-priority path: `job` runs on the UI loop once it is otherwise idle.
    pub fn run_idle<F>(
        &self,
        job: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        if !self.inner.ui.invoke_idle(job) {
            warn!("UI loop is gone, idle job dropped");
        }
    }

    /// Completes `task`. UI tasks observe their completion on the UI loop.
    pub fn deliver(
        &self,
        task: &Arc<Task>,
        outcome: TaskOutcome,
    ) {
        if task.visibility() == TaskVisibility::Ui && !self.inner.ui.is_ui_thread() {
            let delivery = Delivery {
                task: task.clone(),
                outcome: Some(outcome),
            };
            // a rejected or never-run call drops the delivery, failing the task
            self.inner.ui.invoke(move || delivery.complete());
            return;
        }
        task.complete(outcome);
    }

    /// Stops the worker pool and the UI loop.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
        self.inner.ui.quit();
    }
}

/// Completion posted to the UI loop. Dropped without running, it fails the
/// task with `ShutDown`.
struct Delivery {
    task: Arc<Task>,
    outcome: Option<TaskOutcome>,
}

impl Delivery {
    fn complete(mut self) {
        if let Some(outcome) = self.outcome.take() {
            self.task.complete(outcome);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.outcome.take().is_some() {
            trace!(task = %self.task.id(), "UI delivery dropped");
            self.task.complete(Err(TaskError::ShutDown));
        }
    }
}
