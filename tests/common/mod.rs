use std::collections::BTreeMap;
use std::time::Duration;

use prop_engine::EngineConfig;
use prop_engine::GroupConfig;
use prop_engine::GroupMemberConfig;
use prop_engine::PropertyConfig;
use tracing_subscriber::EnvFilter;

pub const WAIT: Duration = Duration::from_secs(10);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

/// `size` (NUL format): the length of each location, computed by `sh`.
pub fn size_group() -> GroupConfig {
    GroupConfig {
        name: "stat".into(),
        command: r#"for p in %N; do printf '%%s\0|\0|size|%%s\0' "$p" "${#p}"; done"#.into(),
        format: "nul".into(),
        workdir: None,
        env: BTreeMap::new(),
        properties: vec![GroupMemberConfig {
            name: "size".into(),
            value_type: "uint".into(),
            preload: true,
        }],
    }
}

fn property(
    name: &str,
    command: &str,
) -> PropertyConfig {
    PropertyConfig {
        name: name.into(),
        value_type: "string".into(),
        command: command.into(),
        format: "lines".into(),
        preload: false,
        workdir: None,
        env: BTreeMap::new(),
    }
}

pub fn engine_config(debounce_ms: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.batch.debounce_ms = debounce_ms;
    config.groups.push(size_group());

    // value taken from the group's environment
    let mut owner = property("owner", r#"for p in %N; do printf '%%s|\n|owner|%%s\n' "$p" "$OWNER"; done"#);
    owner.env.insert("OWNER".into(), "alice".into());
    config.properties.push(owner);

    // exits without output
    config.properties.push(property("silent", "true %N"));

    let mut broken = property("broken", "true %N");
    broken.workdir = Some("/nonexistent/prop-engine-workdir".into());
    config.properties.push(broken);
    config
}
