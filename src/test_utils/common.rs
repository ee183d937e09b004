use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing_subscriber::EnvFilter;

use crate::GroupId;
use crate::PropertyDefinition;
use crate::PropertyGroup;
use crate::SchedulerConfig;
use crate::Task;
use crate::TaskScheduler;
use crate::TaskStep;
use crate::TaskVisibility;
use crate::UiLoop;
use crate::ValueType;
use crate::WireFormat;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Scheduler with a running UI loop; stop it with [`stop_scheduler`].
pub(crate) fn start_scheduler(pool_size: usize) -> (TaskScheduler, JoinHandle<()>) {
    let (ui, runner) = UiLoop::new();
    let ui_thread = runner.spawn().expect("spawn ui loop");
    let scheduler = TaskScheduler::new(&SchedulerConfig { pool_size }, ui, None).expect("scheduler");
    (scheduler, ui_thread)
}

pub(crate) fn stop_scheduler(
    scheduler: TaskScheduler,
    ui_thread: JoinHandle<()>,
) {
    scheduler.shutdown();
    ui_thread.join().expect("ui loop panicked");
}

/// `stat` group producing `size` (uint) and `owner` (string)
pub(crate) fn stat_group(format: WireFormat) -> Arc<PropertyGroup> {
    let id = GroupId::new("stat");
    let def = |name: &str, value_type| {
        Arc::new(PropertyDefinition {
            name: Arc::from(name),
            value_type,
            preload: false,
            group: id.clone(),
        })
    };
    Arc::new(PropertyGroup {
        id: id.clone(),
        command: "stat-props %N".into(),
        format,
        workdir: None,
        env: BTreeMap::new(),
        properties: vec![def("size", ValueType::Uint), def("owner", ValueType::String)],
    })
}

/// A consumer task whose completion is delivered from outside
pub(crate) fn consumer_task(visibility: TaskVisibility) -> Arc<Task> {
    Task::new("consumer", visibility, |_| TaskStep::Deferred)
}
