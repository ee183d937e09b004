use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_INTREF_IDLE_TIMEOUT_SECS;
use crate::constants::DEFAULT_INTREF_SWEEP_INTERVAL_SECS;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IntrefConfig {
    /// Handles untouched for this long are evicted by the sweep
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for IntrefConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl IntrefConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(Error::InvalidConfig("intref.idle_timeout_secs cannot be 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::InvalidConfig("intref.sweep_interval_secs cannot be 0".into()));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_INTREF_IDLE_TIMEOUT_SECS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_INTREF_SWEEP_INTERVAL_SECS
}
