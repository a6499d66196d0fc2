//! Container engine capability.
//!
//! The driver talks to engines only through these traits, so the Docker
//! implementation in `docker_client` can be swapped for an in-memory one in
//! tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::execution::task::Volume;

/// Which engine a connection should be opened to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The local engine at the given endpoint (unix socket or tcp/http URL).
    Local(String),
    /// A remote engine over plain HTTP.
    Remote { host: String, url: String },
}

impl Endpoint {
    /// Returns the host string this endpoint was built for; empty for local.
    pub fn host(&self) -> &str {
        match self {
            Endpoint::Local(_) => "",
            Endpoint::Remote { host, .. } => host,
        }
    }
}

/// Restart policy applied to created containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart; exited containers stay exited.
    No,
}

/// Engine-level container configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    /// `image:tag`.
    pub image: String,
    pub cmd: Vec<String>,
    /// Bind strings in `volume:mount_path` form.
    pub binds: Vec<String>,
    pub volume_driver: String,
    pub restart_policy: RestartPolicy,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

/// Which output stream to read from a container's logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Container identity as reported by inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    /// Display name as the engine reports it (Docker prefixes a `/`).
    pub name: String,
}

impl ContainerInfo {
    /// Returns the display name without the engine's leading `/`.
    pub fn display_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }
}

/// An open connection to one host's container engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Checks that the engine answers.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Pulls `image:tag` onto the host.
    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), EngineError>;

    /// Creates a container and returns its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Stops a container, returning `EngineError::NotRunning` if it already stopped.
    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), EngineError>;

    /// Blocks until the container exits and returns its exit status.
    async fn wait_container(&self, id: &str) -> Result<i64, EngineError>;

    /// Reads the full contents of one log stream.
    async fn logs(&self, id: &str, stream: LogStream) -> Result<String, EngineError>;

    /// Lists the IDs of all containers, running or not.
    async fn list_containers(&self) -> Result<Vec<String>, EngineError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, EngineError>;

    /// Removes a container.
    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<(), EngineError>;

    async fn inspect_volume(&self, name: &str) -> Result<Volume, EngineError>;

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError>;
}

/// Opens engine connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to the given endpoint. Does not ping.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Engine>, EngineError>;
}
