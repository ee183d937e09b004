use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use tracing::warn;

use super::Completion;
use super::TaskOutcome;
use super::TaskScheduler;
use crate::TaskError;

/// Unique identifier assigned to each task at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

/// Where a task is allowed to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskVisibility {
    /// Marshaled onto the single cooperative UI loop
    Ui,
    /// Executed synchronously by the thread calling `run`
    Inline,
    /// Executed by the fixed-size worker pool
    Background,
    /// Handed to the external task queue
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed | TaskState::Cancelled)
    }
}

/// What the body of a task reports back to the scheduler
pub enum TaskStep {
    /// The task is over
    Finished(TaskOutcome),
    /// Someone else completes the task later, through `TaskScheduler::deliver`
    Deferred,
}

pub type TaskFn = Box<dyn FnOnce(&Arc<Task>) -> TaskStep + Send>;

/// Preparatory step run before dispatch. It owns the decision to call
/// `TaskScheduler::run` again, possibly after changing the visibility.
pub type PrerunFn = Box<dyn FnOnce(Arc<Task>, &TaskScheduler) + Send>;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Handle of a hook registered with [`Task::on_cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelHookId(u64);

pub struct Task {
    id: TaskId,
    desc: String,
    visibility: Mutex<TaskVisibility>,
    state: Mutex<TaskState>,
    work: Mutex<Option<TaskFn>>,
    prerun: Mutex<Option<PrerunFn>>,
    cancel_hooks: Mutex<Vec<(CancelHookId, CancelHook)>>,
    next_hook: AtomicU64,
    completion: Completion,
}

impl fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("visibility", &self.visibility())
            .field("state", &self.state())
            .finish()
    }
}

impl Task {
    pub fn new<F>(
        desc: impl Into<String>,
        visibility: TaskVisibility,
        work: F,
    ) -> Arc<Self>
    where
        F: FnOnce(&Arc<Task>) -> TaskStep + Send + 'static,
    {
        Arc::new(Self {
            id: next_task_id(),
            desc: desc.into(),
            visibility: Mutex::new(visibility),
            state: Mutex::new(TaskState::Pending),
            work: Mutex::new(Some(Box::new(work))),
            prerun: Mutex::new(None),
            cancel_hooks: Mutex::new(Vec::new()),
            next_hook: AtomicU64::new(0),
            completion: Completion::new(),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn visibility(&self) -> TaskVisibility {
        *self.visibility.lock()
    }

    pub fn set_visibility(
        &self,
        visibility: TaskVisibility,
    ) {
        *self.visibility.lock() = visibility;
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    pub fn set_prerun<F>(
        &self,
        prerun: F,
    ) where
        F: FnOnce(Arc<Task>, &TaskScheduler) + Send + 'static,
    {
        *self.prerun.lock() = Some(Box::new(prerun));
    }

    pub(crate) fn take_prerun(&self) -> Option<PrerunFn> {
        self.prerun.lock().take()
    }

    /// Runs `hook` when the task gets cancelled; right away if it already was.
    ///
    /// Returns `None` when the hook will never be kept: it already ran, or the
    /// task finished otherwise. Hooks are dropped once the task completes.
    pub fn on_cancel<F>(
        &self,
        hook: F,
    ) -> Option<CancelHookId>
    where
        F: FnOnce() + Send + 'static,
    {
        let state = self.state.lock();
        if *state == TaskState::Cancelled {
            drop(state);
            hook();
            return None;
        }
        if state.is_terminal() {
            return None;
        }
        let id = CancelHookId(self.next_hook.fetch_add(1, Ordering::Relaxed));
        self.cancel_hooks.lock().push((id, Box::new(hook)));
        Some(id)
    }

    /// Unregisters a hook added with [`Task::on_cancel`].
    pub fn remove_cancel_hook(
        &self,
        id: CancelHookId,
    ) -> bool {
        let mut hooks = self.cancel_hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hook, _)| *hook != id);
        hooks.len() != before
    }

    #[cfg(test)]
    pub(crate) fn cancel_hook_count(&self) -> usize {
        self.cancel_hooks.lock().len()
    }

    pub fn on_complete<F>(
        &self,
        callback: F,
    ) where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        self.completion.on_complete(callback);
    }

    /// Readiness signal of the task
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.completion.outcome()
    }

    /// Blocks until the task is over. Never call this on the UI loop thread.
    pub fn wait(&self) -> TaskOutcome {
        self.completion.wait()
    }

    /// Resolves once the task is over.
    pub async fn completed(&self) -> TaskOutcome {
        let rx = self.completion.subscribe();
        rx.await.unwrap_or(Err(TaskError::Cancelled))
    }

    /// Finishes the task. Returns `false` if it was already over, which makes
    /// completion and cancellation safe to race.
    pub fn complete(
        &self,
        outcome: TaskOutcome,
    ) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                trace!(task = %self.id, "ignoring completion of finished task");
                return false;
            }
            *state = if outcome.is_ok() {
                TaskState::Done
            } else {
                TaskState::Failed
            };
        }
        drop(std::mem::take(&mut *self.cancel_hooks.lock()));
        self.completion.complete(outcome)
    }

    /// Cancels the task unless it is already over. Hooks and completion
    /// callbacks run on the calling thread.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = TaskState::Cancelled;
        }
        let hooks = std::mem::take(&mut *self.cancel_hooks.lock());
        for (_, hook) in hooks {
            hook();
        }
        self.completion.complete(Err(TaskError::Cancelled))
    }

    fn mark_running(&self) -> bool {
        let mut state = self.state.lock();
        if *state != TaskState::Pending {
            return false;
        }
        *state = TaskState::Running;
        true
    }
}

/// Runs the body of `task` on the current thread.
pub(crate) fn execute(task: &Arc<Task>) {
    if !task.mark_running() {
        trace!(task = %task.id(), state = ?task.state(), "skipping task that is not pending");
        return;
    }

    let Some(work) = task.work.lock().take() else {
        warn!(task = %task.id(), "task has no work attached");
        task.complete(Err(TaskError::Failed(format!("{} has no work", task.desc()))));
        return;
    };

    match work(task) {
        TaskStep::Finished(outcome) => {
            task.complete(outcome);
        }
        TaskStep::Deferred => {
            trace!(task = %task.id(), "task deferred its completion");
        }
    }
}
