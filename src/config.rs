//! Cluster configuration.
//!
//! The membership set and engine connection settings are read once, either
//! from the environment or built explicitly, and then handed to the driver.
//! Nothing in the crate reads process state after that point.

use serde::{Deserialize, Serialize};

/// Environment variable listing cluster members, comma-separated.
pub const CLUSTER_NODES_ENV: &str = "CLUSTER_NODES";

/// Environment variable overriding the local engine endpoint.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Local engine endpoint used when no override is configured.
pub const DEFAULT_LOCAL_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Plain-HTTP port the engine listens on for remote hosts.
pub const DEFAULT_ENGINE_PORT: u16 = 2375;

/// Request timeout for engine connections, in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 120;

/// Immutable cluster and engine connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Known cluster member addresses, in preference order.
    pub nodes: Vec<String>,
    /// Endpoint override for the local engine (unix socket or tcp/http URL).
    #[serde(default)]
    pub local_endpoint: Option<String>,
    /// Engine port used for remote hosts.
    pub engine_port: u16,
    /// Timeout applied to engine requests, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            local_endpoint: None,
            engine_port: DEFAULT_ENGINE_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl ClusterConfig {
    /// Creates a configuration with the given membership set.
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Builds a configuration from `CLUSTER_NODES` and `DOCKER_HOST`.
    pub fn from_env() -> Self {
        let nodes = std::env::var(CLUSTER_NODES_ENV)
            .map(|raw| parse_nodes(&raw))
            .unwrap_or_default();
        let local_endpoint = std::env::var(DOCKER_HOST_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            nodes,
            local_endpoint,
            ..Default::default()
        }
    }

    /// Sets the local engine endpoint override.
    pub fn with_local_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.local_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the engine port used for remote hosts.
    pub fn with_engine_port(mut self, port: u16) -> Self {
        self.engine_port = port;
        self
    }

    /// Sets the engine request timeout.
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Returns the endpoint used for the local engine.
    pub fn local_endpoint(&self) -> &str {
        self.local_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_LOCAL_ENDPOINT)
    }

    /// Returns the endpoint URL for a remote host.
    pub fn remote_endpoint(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.engine_port)
    }
}

/// Splits a comma-separated membership list, dropping empty entries.
pub fn parse_nodes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect()
}
