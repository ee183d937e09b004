use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_POOL_SIZE;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Number of threads in the background worker pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
        }
    }
}

impl SchedulerConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("scheduler.pool_size must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}
