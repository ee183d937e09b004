use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::execute;
use super::Task;
use crate::constants::WORKER_THREAD_PREFIX;
use crate::Result;

/// Fixed-size pool executing background tasks in submission order.
pub(crate) struct WorkerPool {
    sender: Mutex<Option<Sender<Arc<Task>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(size: usize) -> Result<Self> {
        let (sender, receiver) = unbounded::<Arc<Task>>();
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", WORKER_THREAD_PREFIX, index))
                .spawn(move || worker_loop(index, receiver))?;
            handles.push(handle);
        }
        debug!(size, "worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        })
    }

    /// Queues `task`; hands it back if the pool is shut down.
    pub(crate) fn submit(
        &self,
        task: Arc<Task>,
    ) -> std::result::Result<(), Arc<Task>> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(task).map_err(|e| e.into_inner()),
            None => Err(task),
        }
    }

    /// Lets the workers drain the queue, then joins them.
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            // a worker shutting the pool down cannot join itself
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    index: usize,
    receiver: Receiver<Arc<Task>>,
) {
    while let Ok(task) = receiver.recv() {
        trace!(worker = index, task = %task.id(), "worker picked up task");
        execute(&task);
    }
    trace!(worker = index, "worker exits");
}
