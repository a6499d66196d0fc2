//! Docker execution layer for dockrun tasks.
//!
//! This module drives one-shot containers across a flat cluster of Docker
//! hosts using the bollard crate.
//!
//! # Architecture
//!
//! Container states follow this lifecycle:
//! ```text
//! CREATED → RUNNING → COMPLETED / FAILED
//!    └─────────┴──────────→ DESTROYED
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dockrun::config::ClusterConfig;
//! use dockrun::execution::{Driver, Task, VolumeSpec};
//!
//! let driver = Driver::docker(ClusterConfig::from_env());
//!
//! let task = Task::new("t1", "alpine", VolumeSpec::new("v1", "/data", "local"))
//!     .with_host("external")
//!     .with_command(["echo", "hi"]);
//!
//! let mut ctx = driver.create(&task).await?;
//! driver.run(&mut ctx).await?;
//! println!("{} exited with {:?}", ctx.task.name, ctx.status);
//! driver.destroy(&mut ctx).await?;
//! ```

pub mod context;
pub mod docker_client;
pub mod driver;
pub mod engine;
pub mod resolver;
pub mod task;

#[cfg(test)]
pub(crate) mod mock;

pub use context::{ExecutionContext, TaskState};
pub use docker_client::{DockerClient, DockerConnector};
pub use driver::Driver;
pub use engine::{Connector, Endpoint, Engine};
pub use resolver::{select_peer, HostResolver, LocalAddresses, SystemInterfaces};
pub use task::{HostHint, Task, Volume, VolumeSpec, EXTERNAL_HOST};
