//! Visibility-based task scheduling.
//!
//! A [`Task`] declares where it may run ([`TaskVisibility`]); the
//! [`TaskScheduler`] places it inline, on the UI loop, on the worker pool or
//! on the external queue, and publishes its outcome through a [`Completion`].
mod completion;
mod task;
mod task_scheduler;
mod ui_loop;
mod worker_pool;

pub use completion::*;
pub use task::*;
pub use task_scheduler::*;
pub use ui_loop::*;
pub(crate) use worker_pool::*;

#[cfg(test)]
mod task_test;
