use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// A standalone property: it owns its command and forms a group of one.
///
/// Value type and wire format stay plain strings here so that one bad entry
/// is rejected by the registry instead of failing the whole configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PropertyConfig {
    pub name: String,

    /// `string` or `uint`
    #[serde(rename = "type", default = "default_value_type")]
    pub value_type: String,

    /// Command line template; `%N` expands to the batch's node locations
    pub command: String,

    /// `lines` or `nul`
    #[serde(default = "default_format")]
    pub format: String,

    /// Requested for every node handed to `PropertyEngine::preload`
    #[serde(default)]
    pub preload: bool,

    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Several properties produced by a single command invocation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,

    pub command: String,

    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub properties: Vec<GroupMemberConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GroupMemberConfig {
    pub name: String,

    #[serde(rename = "type", default = "default_value_type")]
    pub value_type: String,

    #[serde(default)]
    pub preload: bool,
}

fn default_value_type() -> String {
    "string".into()
}
fn default_format() -> String {
    "lines".into()
}
