use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::TaskError;

/// Final result of a task as seen by its observers
pub type TaskOutcome = std::result::Result<(), TaskError>;

type CompletionCallback = Box<dyn FnOnce(&TaskOutcome) + Send>;

/// One-shot completion signal of a task.
///
/// The first `complete` wins; callbacks run exactly once, on the completing
/// thread, outside the internal lock. Blocking waiters park on a condition
/// variable until the outcome is published.
#[derive(Default)]
pub struct Completion {
    inner: Mutex<CompletionInner>,
    ready: Condvar,
}

#[derive(Default)]
struct CompletionInner {
    outcome: Option<TaskOutcome>,
    callbacks: Vec<CompletionCallback>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `outcome`. Returns `false` if an outcome was already set.
    pub(crate) fn complete(
        &self,
        outcome: TaskOutcome,
    ) -> bool {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(outcome.clone());
            std::mem::take(&mut inner.callbacks)
        };
        self.ready.notify_all();

        for callback in callbacks {
            callback(&outcome);
        }
        true
    }

    /// Registers `callback`; runs it right away if the outcome is known.
    pub fn on_complete<F>(
        &self,
        callback: F,
    ) where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        match inner.outcome.clone() {
            Some(outcome) => {
                drop(inner);
                callback(&outcome);
            }
            None => inner.callbacks.push(Box::new(callback)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.lock().outcome.clone()
    }

    /// Blocks the calling thread until the outcome is published.
    pub fn wait(&self) -> TaskOutcome {
        let mut inner = self.inner.lock();
        loop {
            if let Some(outcome) = &inner.outcome {
                return outcome.clone();
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Like [`Completion::wait`], giving up after `timeout`.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<TaskOutcome> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(outcome) = &inner.outcome {
                return Some(outcome.clone());
            }
            if self.ready.wait_until(&mut inner, deadline).timed_out() {
                return inner.outcome.clone();
            }
        }
    }

    /// Async view of the outcome for callers living on a runtime.
    pub fn subscribe(&self) -> oneshot::Receiver<TaskOutcome> {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        rx
    }
}
