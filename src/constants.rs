// -
// Batching

/// Placeholder replaced by the batch's node locations
pub(crate) const NODES_PLACEHOLDER: &str = "%N";

/// Separator between tokens of a property record
pub(crate) const FIELD_SEPARATOR: u8 = b'|';

pub(crate) const DEFAULT_DEBOUNCE_MS: u64 = 800;
pub(crate) const DEFAULT_SOFT_CAP: usize = 20;
pub(crate) const DEFAULT_OVERFLOW_WINDOW_MS: u64 = 20;
pub(crate) const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

// -
// Scheduler

pub(crate) const DEFAULT_POOL_SIZE: usize = 5;

pub(crate) const WORKER_THREAD_PREFIX: &str = "prop-worker";
pub(crate) const UI_THREAD_NAME: &str = "prop-ui-loop";

// -
// Intrefs

pub(crate) const DEFAULT_INTREF_IDLE_TIMEOUT_SECS: u64 = 300;
pub(crate) const DEFAULT_INTREF_SWEEP_INTERVAL_SECS: u64 = 60;
pub(crate) const INTREF_PREFIX: &str = "intref:";
