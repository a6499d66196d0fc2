//! Error types for dockrun operations.
//!
//! Two layers of errors exist:
//! - `EngineError`: structured failures reported by a container engine
//!   connection (the `Engine` and `Connector` traits)
//! - `DriverError`: failures of a lifecycle operation, naming the stage
//!   that failed so callers can decide whether to retry or clean up

use std::fmt;

use thiserror::Error;

/// Errors reported by a container engine connection.
///
/// `NotFound` and `NotRunning` are distinct variants so that callers can
/// match on them instead of inspecting messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("No such object: {0}")]
    NotFound(String),

    #[error("Container '{0}' is not running")]
    NotRunning(String),

    #[error("Engine unreachable: {0}")]
    Unreachable(String),

    #[error("Engine API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Engine transport error: {0}")]
    Transport(String),
}

/// A step of the container lifecycle, used to tag operation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Stop,
    Wait,
    StdoutLogs,
    StderrLogs,
    List,
    Inspect,
    Remove,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Start => write!(f, "start"),
            Stage::Stop => write!(f, "stop"),
            Stage::Wait => write!(f, "wait"),
            Stage::StdoutLogs => write!(f, "stdout capture"),
            Stage::StderrLogs => write!(f, "stderr capture"),
            Stage::List => write!(f, "list"),
            Stage::Inspect => write!(f, "inspect"),
            Stage::Remove => write!(f, "remove"),
        }
    }
}

/// Errors that can occur during lifecycle driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Host '{host}' unreachable: {source}")]
    HostUnreachable {
        host: String,
        #[source]
        source: EngineError,
    },

    #[error("Cannot find any other Docker host in the cluster")]
    NoPeerHostAvailable,

    #[error("Failed to pull image '{image}': {source}")]
    ImagePullFailed {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to create container '{name}': {source}")]
    ContainerCreateFailed {
        name: String,
        #[source]
        source: EngineError,
    },

    #[error("Container '{id}' {stage} failed: {source}")]
    ContainerOperationFailed {
        id: String,
        stage: Stage,
        #[source]
        source: EngineError,
    },

    #[error("Container '{id}' was destroyed and cannot be used for {stage}")]
    ContainerDestroyed { id: String, stage: Stage },

    #[error("Volume '{name}' operation failed: {reason}")]
    VolumeOperationFailed { name: String, reason: String },

    #[error("Wait on container '{id}' aborted, container state unknown")]
    Aborted { id: String },
}

impl DriverError {
    /// Returns the lifecycle stage a container operation failed in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DriverError::ContainerOperationFailed { stage, .. }
            | DriverError::ContainerDestroyed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
