use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_DEBOUNCE_MS;
use crate::constants::DEFAULT_OVERFLOW_WINDOW_MS;
use crate::constants::DEFAULT_READ_CHUNK_SIZE;
use crate::constants::DEFAULT_SOFT_CAP;
use crate::Error;
use crate::Result;

/// Flush policy of the batch collector
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchConfig {
    /// Delay between the first pending request of a batch and its flush
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Pending node count at which a batch stops waiting and flushes at once
    #[serde(default = "default_soft_cap")]
    pub soft_cap: usize,

    /// Delay between reaching the soft cap and the flush, letting the rest
    /// of a burst join. Not extended by later requests; capped at the
    /// debounce delay.
    #[serde(default = "default_overflow_window_ms")]
    pub overflow_window_ms: u64,

    /// Size of a single read from a subprocess's stdout
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            soft_cap: default_soft_cap(),
            overflow_window_ms: default_overflow_window_ms(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

impl BatchConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(Error::InvalidConfig("batch.debounce_ms cannot be 0".into()));
        }
        if self.soft_cap == 0 {
            return Err(Error::InvalidConfig("batch.soft_cap must be at least 1".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(Error::InvalidConfig("batch.read_chunk_size cannot be 0".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn overflow_window(&self) -> Duration {
        Duration::from_millis(self.overflow_window_ms.min(self.debounce_ms))
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_soft_cap() -> usize {
    DEFAULT_SOFT_CAP
}
fn default_overflow_window_ms() -> u64 {
    DEFAULT_OVERFLOW_WINDOW_MS
}
fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}
