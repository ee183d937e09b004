//! Configuration management for the property engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file named by `CONFIG_PATH`
//! - Environment variable overrides (`PROPS__SECTION__KEY`)
//! - Component-wise validation
mod batch;
mod intref;
mod property;
mod scheduler;
pub use batch::*;
pub use intref::*;
pub use property::*;
pub use scheduler::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "PROPS";

/// Main configuration container for the engine components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub intref: IntrefConfig,

    /// Standalone properties, each forming an implicit group of one
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,

    /// Property groups sharing one command invocation
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

impl Debug for EngineConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("scheduler", &self.scheduler)
            .field("batch", &self.batch)
            .field("properties", &self.properties.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl EngineConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order, later ones overriding earlier ones:
    /// 1. Type defaults
    /// 2. File named by the `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with the `PROPS__` prefix
    ///
    /// Callers must call [`EngineConfig::validate`] once all overrides are
    /// applied.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from `path` without validation.
    ///
    /// Environment variables are re-applied on top so they keep the highest
    /// priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates engine settings and returns the validated instance.
    ///
    /// Property and group definitions are not checked here: the registry
    /// validates them one by one and skips the malformed ones.
    pub fn validate(self) -> Result<Self> {
        self.scheduler.validate()?;
        self.batch.validate()?;
        self.intref.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
