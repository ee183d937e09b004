use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::TaskError;

fn noop_task(visibility: TaskVisibility) -> Arc<Task> {
    Task::new("noop", visibility, |_| TaskStep::Finished(Ok(())))
}

#[test]
fn test_task_ids_are_unique() {
    let a = noop_task(TaskVisibility::Inline);
    let b = noop_task(TaskVisibility::Inline);
    assert_ne!(a.id(), b.id());
    assert!(a.id() < b.id());
}

#[test]
fn test_completion_runs_callbacks_once() {
    let task = noop_task(TaskVisibility::Inline);
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    task.on_complete(move |outcome| {
        assert!(outcome.is_ok());
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(task.complete(Ok(())));
    assert!(!task.complete(Err(TaskError::Failed("late".into()))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(task.state(), TaskState::Done);
    assert_eq!(task.outcome(), Some(Ok(())));
}

#[test]
fn test_on_complete_after_completion_runs_immediately() {
    let task = noop_task(TaskVisibility::Inline);
    task.complete(Err(TaskError::Failed("boom".into())));

    let seen = Arc::new(parking_lot::Mutex::new(None));
    let seen_clone = seen.clone();
    task.on_complete(move |outcome| {
        *seen_clone.lock() = Some(outcome.clone());
    });
    assert_eq!(*seen.lock(), Some(Err(TaskError::Failed("boom".into()))));
    assert_eq!(task.state(), TaskState::Failed);
}

#[test]
fn test_cancel_is_idempotent_with_completion() {
    let task = noop_task(TaskVisibility::Inline);
    let hooks = Arc::new(AtomicU32::new(0));
    let hooks_clone = hooks.clone();
    task.on_cancel(move || {
        hooks_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(task.cancel());
    assert!(!task.cancel());
    assert!(!task.complete(Ok(())));
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
    assert_eq!(task.state(), TaskState::Cancelled);
    assert_eq!(task.outcome(), Some(Err(TaskError::Cancelled)));

    // registering after the fact still fires
    let hooks_clone = hooks.clone();
    task.on_cancel(move || {
        hooks_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(hooks.load(Ordering::SeqCst), 2);
}

#[test]
fn test_completed_task_ignores_cancellation() {
    let task = noop_task(TaskVisibility::Inline);
    let hooks = Arc::new(AtomicU32::new(0));
    let hooks_clone = hooks.clone();
    task.on_cancel(move || {
        hooks_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(task.complete(Ok(())));
    assert!(!task.cancel());
    assert_eq!(hooks.load(Ordering::SeqCst), 0);
    assert_eq!(task.state(), TaskState::Done);
}

#[test]
fn test_cancel_hooks_can_be_removed_and_are_dropped_on_completion() {
    let task = noop_task(TaskVisibility::Inline);
    let hooks = Arc::new(AtomicU32::new(0));
    let hooks_clone = hooks.clone();
    let removed = task
        .on_cancel(move || {
            hooks_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let kept = task.on_cancel(|| {});

    assert!(kept.is_some());
    assert!(task.remove_cancel_hook(removed));
    assert!(!task.remove_cancel_hook(removed));
    assert_eq!(task.cancel_hook_count(), 1);

    assert!(task.complete(Ok(())));
    assert_eq!(task.cancel_hook_count(), 0);
    assert_eq!(task.on_cancel(|| {}), None);
    assert_eq!(hooks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_execute_skips_cancelled_task() {
    let ran = Arc::new(AtomicU32::new(0));
    let ran_clone = ran.clone();
    let task = Task::new("cancelled", TaskVisibility::Inline, move |_| {
        ran_clone.fetch_add(1, Ordering::SeqCst);
        TaskStep::Finished(Ok(()))
    });
    task.cancel();
    execute(&task);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_deferred_task_stays_running_until_completed() {
    let task = Task::new("deferred", TaskVisibility::Inline, |_| TaskStep::Deferred);
    execute(&task);
    assert_eq!(task.state(), TaskState::Running);
    assert!(!task.completion().is_ready());
    assert!(task.completion().wait_timeout(Duration::from_millis(10)).is_none());

    let waiter = {
        let task = task.clone();
        std::thread::spawn(move || task.wait())
    };
    task.complete(Ok(()));
    assert_eq!(waiter.join().unwrap(), Ok(()));
}

#[tokio::test]
async fn test_completed_future_resolves() {
    let task = Task::new("async", TaskVisibility::Inline, |_| TaskStep::Deferred);
    let observer = {
        let task = task.clone();
        tokio::spawn(async move { task.completed().await })
    };
    tokio::task::yield_now().await;
    task.complete(Err(TaskError::Unresolved {
        property: "size".into(),
        node: "fs:/tmp/a".into(),
    }));
    assert_eq!(
        observer.await.unwrap(),
        Err(TaskError::Unresolved {
            property: "size".into(),
            node: "fs:/tmp/a".into(),
        })
    );
}
