use std::sync::Arc;

use prop_engine::AppContext;
use prop_engine::ContextBuilder;
use prop_engine::MemoryNodeStore;
use prop_engine::PropertyValue;
use prop_engine::TaskError;
use tokio::time::timeout;

use crate::common::engine_config;
use crate::common::enable_logger;
use crate::common::WAIT;

fn start(debounce_ms: u64) -> (AppContext, Arc<MemoryNodeStore>) {
    enable_logger();
    let store = Arc::new(MemoryNodeStore::new("fs"));
    let ctx = ContextBuilder::from_config("fs", engine_config(debounce_ms))
        .store(store.clone())
        .build()
        .expect("context");
    assert!(ctx.rejected().is_empty());
    (ctx, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_shell_invocation_serves_a_batch() {
    let (ctx, store) = start(50);
    let a = store.insert("/tmp/a");
    let spaced = store.insert("/tmp/with space");
    let quoted = store.insert("/tmp/it's");

    let tasks: Vec<_> = [&a, &spaced, &quoted]
        .into_iter()
        .map(|node| ctx.engine().refresh(node, "size"))
        .collect();
    for task in &tasks {
        assert_eq!(timeout(WAIT, task.completed()).await.unwrap(), Ok(()));
    }

    assert_eq!(store.value(&a, "size"), Some(PropertyValue::Uint(6)));
    assert_eq!(store.value(&spaced, "size"), Some(PropertyValue::Uint(15)));
    assert_eq!(store.value(&quoted, "size"), Some(PropertyValue::Uint(9)));
    ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_line_format_with_group_environment() {
    let (ctx, store) = start(20);
    let a = store.insert("/tmp/a");

    let task = ctx.engine().refresh_now(&a, "owner");

    assert_eq!(timeout(WAIT, task.completed()).await.unwrap(), Ok(()));
    assert_eq!(store.value(&a, "owner"), Some(PropertyValue::String("alice".into())));
    ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_and_unstartable_commands_fail_their_requests() {
    let (ctx, store) = start(20);
    let a = store.insert("/tmp/a");

    let silent = ctx.engine().refresh(&a, "silent");
    let broken = ctx.engine().refresh(&a, "broken");

    assert_eq!(
        timeout(WAIT, silent.completed()).await.unwrap(),
        Err(TaskError::Unresolved {
            property: "silent".into(),
            node: "fs:/tmp/a".into(),
        })
    );
    assert!(matches!(
        timeout(WAIT, broken.completed()).await.unwrap(),
        Err(TaskError::Spawn { .. })
    ));
    assert_eq!(store.value(&a, "silent"), None);
    ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_refresh_and_preload() {
    let (ctx, store) = start(20);
    let a = store.insert("/tmp/a");
    let b = store.insert("/tmp/bb");

    let engine = ctx.engine().clone();
    let node = a.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.refresh_blocking(&node, "size", None))
        .await
        .unwrap();
    assert_eq!(outcome, Ok(()));
    assert_eq!(store.value(&a, "size"), Some(PropertyValue::Uint(6)));

    let preloads = ctx.engine().preload(&b);
    assert_eq!(preloads.len(), 1);
    assert_eq!(timeout(WAIT, preloads[0].completed()).await.unwrap(), Ok(()));
    assert_eq!(store.value(&b, "size"), Some(PropertyValue::Uint(7)));
    ctx.shutdown();
}
