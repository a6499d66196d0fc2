//! dockrun: one-shot container tasks across a flat cluster of Docker hosts.
//!
//! This library creates, starts, waits on and destroys containers on a
//! chosen host, and can pick any cluster member other than the local machine
//! when the caller does not care where a task runs.

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;

// Re-export commonly used types
pub use config::ClusterConfig;
pub use error::{DriverError, EngineError, Stage};
pub use execution::{Driver, ExecutionContext, HostHint, Task, TaskState, Volume, VolumeSpec};
