use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Type of a property's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Uint,
}

impl FromStr for ValueType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(ValueType::String),
            "uint" => Ok(ValueType::Uint),
            _ => Err(()),
        }
    }
}

/// Token terminator used by a command's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// Newline-terminated tokens
    Lines,
    /// NUL-terminated tokens; values may hold any other byte
    Nul,
}

impl WireFormat {
    pub fn terminator(self) -> u8 {
        match self {
            WireFormat::Lines => b'\n',
            WireFormat::Nul => b'\0',
        }
    }
}

impl FromStr for WireFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lines" => Ok(WireFormat::Lines),
            "nul" => Ok(WireFormat::Nul),
            _ => Err(()),
        }
    }
}

/// Name of a property group; standalone properties use their own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(Arc<str>);

impl GroupId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: Arc<str>,
    pub value_type: ValueType,
    pub preload: bool,
    pub group: GroupId,
}

/// One command invocation producing one or more properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyGroup {
    pub id: GroupId,
    pub command: String,
    pub format: WireFormat,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub properties: Vec<Arc<PropertyDefinition>>,
}

impl PropertyGroup {
    /// Linear scan; groups hold a handful of properties.
    pub fn property(
        &self,
        name: &[u8],
    ) -> Option<&Arc<PropertyDefinition>> {
        self.properties.iter().find(|p| p.name.as_bytes() == name)
    }
}
