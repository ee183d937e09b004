use std::sync::Arc;
use std::sync::OnceLock;
use std::thread;
use std::thread::JoinHandle;
use std::thread::ThreadId;

use crossbeam_channel::select;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use tracing::debug;
use tracing::warn;

use super::execute;
use super::Task;
use crate::constants::UI_THREAD_NAME;
use crate::TaskError;

enum UiJob {
    Task(Arc<Task>),
    Call(Box<dyn FnOnce() + Send>),
    Quit,
}

/// Handle posting work onto the single cooperative UI loop.
///
/// Regular jobs always go before idle jobs; an idle job only runs when no
/// regular job is queued.
#[derive(Clone)]
pub struct UiLoop {
    regular: Sender<UiJob>,
    idle: Sender<UiJob>,
    thread: Arc<OnceLock<ThreadId>>,
}

/// Drives the loop; owned by whichever thread becomes the UI thread.
pub struct UiLoopRunner {
    regular: Receiver<UiJob>,
    idle: Receiver<UiJob>,
    thread: Arc<OnceLock<ThreadId>>,
}

impl UiLoop {
    pub fn new() -> (UiLoop, UiLoopRunner) {
        let (regular_tx, regular_rx) = unbounded();
        let (idle_tx, idle_rx) = unbounded();
        let thread = Arc::new(OnceLock::new());
        (
            UiLoop {
                regular: regular_tx,
                idle: idle_tx,
                thread: thread.clone(),
            },
            UiLoopRunner {
                regular: regular_rx,
                idle: idle_rx,
                thread,
            },
        )
    }

    pub(crate) fn post_task(
        &self,
        task: Arc<Task>,
    ) -> bool {
        self.regular.send(UiJob::Task(task)).is_ok()
    }

    /// Runs `f` on the UI thread as soon as the loop gets to it.
    pub fn invoke<F>(
        &self,
        f: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.regular.send(UiJob::Call(Box::new(f))).is_ok()
    }

    /// Runs `f` on the UI thread once no regular job is waiting.
    pub fn invoke_idle<F>(
        &self,
        f: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.idle.send(UiJob::Call(Box::new(f))).is_ok()
    }

    pub fn is_ui_thread(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }

    /// Asks the loop to stop after the jobs already queued ahead of this call.
    pub fn quit(&self) {
        let _ = self.regular.send(UiJob::Quit);
    }
}

impl UiLoopRunner {
    /// Runs the loop on the current thread until [`UiLoop::quit`].
    pub fn run(self) {
        if self.thread.set(thread::current().id()).is_err() {
            warn!("UI loop started twice");
            return;
        }
        debug!("UI loop running");

        while let Some(job) = self.next_job() {
            match job {
                UiJob::Task(task) => execute(&task),
                UiJob::Call(f) => f(),
                UiJob::Quit => break,
            }
        }

        self.drain();
        debug!("UI loop stopped");
    }

    /// Runs the loop on a dedicated, named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(UI_THREAD_NAME.into())
            .spawn(move || self.run())
    }

    fn next_job(&self) -> Option<UiJob> {
        if let Ok(job) = self.regular.try_recv() {
            return Some(job);
        }
        if let Ok(job) = self.idle.try_recv() {
            return Some(job);
        }
        select! {
            recv(self.regular) -> job => job.ok(),
            recv(self.idle) -> job => job.ok(),
        }
    }

    /// Fails the tasks still queued when the loop stops and runs the queued
    /// calls, which may be completions posted by `deliver`.
    fn drain(&self) {
        let mut calls = 0;
        for job in self.regular.try_iter().chain(self.idle.try_iter()) {
            match job {
                UiJob::Task(task) => {
                    task.complete(Err(TaskError::ShutDown));
                }
                UiJob::Call(f) => {
                    f();
                    calls += 1;
                }
                UiJob::Quit => {}
            }
        }
        if calls > 0 {
            debug!(calls, "ran calls queued behind quit");
        }
    }
}
