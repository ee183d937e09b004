//! Error hierarchy of the property engine.
//!
//! Load-time errors ([`Error`], [`PropertyError`]) stay local to the caller.
//! Per-request failures are [`TaskError`]s delivered through the task's
//! completion; they are clonable because a completion may be observed by
//! several waiters. [`ParseError`] only ever reaches the logs.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration source or deserialization failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A property definition was rejected
    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Semantic validation of engine settings failed
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// CONFIG_ERROR: a malformed property or group definition.
///
/// The registry logs and skips the offending definition; the owning provider
/// simply lacks that property.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("property name {name:?} is invalid: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("property {name}: unknown value type {value_type:?}")]
    UnknownValueType { name: String, value_type: String },

    #[error("group {group}: unknown wire format {format:?}")]
    UnknownWireFormat { group: String, format: String },

    #[error("group {group}: command template {command:?} has no %N placeholder")]
    MissingPlaceholder { group: String, command: String },

    #[error("group {group} declares no properties")]
    EmptyGroup { group: String },

    #[error("property {name} is defined more than once")]
    Duplicate { name: String },

    #[error("group {group} is defined more than once")]
    DuplicateGroup { group: String },
}

/// Failure of a single consumer request, delivered through its task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// SPAWN_ERROR: the batch's subprocess could not be started
    #[error("failed to run {command:?}: {reason}")]
    Spawn { command: String, reason: String },

    /// UNRESOLVED: the stream ended without a value for this request
    #[error("property {property} was not refreshed for {node}")]
    Unresolved { property: String, node: String },

    #[error("no property {property} defined for {node}")]
    UnknownProperty { property: String, node: String },

    /// The node vanished before its request could be queued
    #[error("node {node} is no longer available")]
    NodeGone { node: String },

    #[error("task was cancelled")]
    Cancelled,

    #[error("scheduler is shut down")]
    ShutDown,

    /// `run_and_wait` was invoked on the UI loop thread
    #[error("blocking wait requested from the UI thread")]
    CalledFromUiThread,

    #[error("{0}")]
    Failed(String),
}

/// Redemption failures of opaque handles
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntrefError {
    #[error("{0:?} is not an intref")]
    Malformed(String),

    /// Never issued, removed, or swept after its idle timeout
    #[error("intref {0} does not exist")]
    Missing(String),

    #[error("intref {id} holds a {actual}, not a {expected}")]
    TypeMismatch {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// PARSE_ERROR: one malformed record of a subprocess stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("node {0:?} is not part of this refresh")]
    UnknownNode(String),

    #[error("expected node {expected:?}, got {got:?}")]
    NodeMismatch { expected: String, got: String },

    #[error("node line {0:?} lacks its trailing separator")]
    MalformedNode(String),

    #[error("property token {0:?} lacks a separator")]
    MissingSeparator(String),

    #[error("property token {0:?} arrived before any node")]
    NoCurrentNode(String),

    #[error("unknown property {0:?}")]
    UnknownProperty(String),

    #[error("invalid value {value:?} for property {property}")]
    InvalidValue { property: String, value: String },

    #[error("token is not valid UTF-8")]
    InvalidEncoding,
}
