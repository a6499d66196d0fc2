//! Host resolution and engine connection.
//!
//! A concrete host hint is connected to as-is. The wildcard hint picks the
//! first cluster member that is not one of this machine's own IPv4 addresses:
//! list order decides, nothing else is weighed.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;

use crate::config::ClusterConfig;
use crate::error::{DriverError, EngineError};
use crate::execution::engine::{Connector, Endpoint, Engine};
use crate::execution::task::HostHint;

/// Source of the addresses that identify this machine.
pub trait LocalAddresses: Send + Sync {
    fn local_addresses(&self) -> Result<HashSet<String>, EngineError>;
}

/// Reads addresses from the host's network interfaces.
///
/// Only interfaces that are up, not loopback, and carry an IPv4 address count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl LocalAddresses for SystemInterfaces {
    fn local_addresses(&self) -> Result<HashSet<String>, EngineError> {
        let addrs = getifaddrs().map_err(|e| {
            EngineError::Unreachable(format!("Failed to enumerate network interfaces: {e}"))
        })?;

        let mut local = HashSet::new();
        for ifaddr in addrs {
            if !ifaddr.flags.contains(InterfaceFlags::IFF_UP)
                || ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK)
            {
                continue;
            }
            let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
                continue;
            };
            let ip: Ipv4Addr = *SocketAddrV4::from(*sin).ip();
            if ip.is_loopback() || ip.is_unspecified() {
                continue;
            }
            local.insert(ip.to_string());
        }

        Ok(local)
    }
}

/// Returns the first member of `nodes` that is not a local address.
pub fn select_peer<'a>(nodes: &'a [String], local: &HashSet<String>) -> Option<&'a str> {
    nodes
        .iter()
        .map(String::as_str)
        .find(|node| !local.contains(*node))
}

/// Turns host hints into live engine connections.
pub struct HostResolver {
    config: Arc<ClusterConfig>,
    connector: Arc<dyn Connector>,
    interfaces: Arc<dyn LocalAddresses>,
}

impl HostResolver {
    pub fn new(
        config: Arc<ClusterConfig>,
        connector: Arc<dyn Connector>,
        interfaces: Arc<dyn LocalAddresses>,
    ) -> Self {
        Self {
            config,
            connector,
            interfaces,
        }
    }

    /// Returns the cluster membership set.
    pub fn nodes(&self) -> &[String] {
        &self.config.nodes
    }

    /// Resolves a hint to a concrete host, without connecting.
    pub fn resolve(&self, requested: &HostHint) -> Result<HostHint, DriverError> {
        match requested {
            HostHint::AnyPeer => {
                if self.config.nodes.is_empty() {
                    return Err(DriverError::NoPeerHostAvailable);
                }
                let local = self.interfaces.local_addresses().map_err(|source| {
                    DriverError::HostUnreachable {
                        host: requested.to_string(),
                        source,
                    }
                })?;
                let peer = select_peer(&self.config.nodes, &local)
                    .ok_or(DriverError::NoPeerHostAvailable)?;
                tracing::info!(host = %peer, "Selecting Docker host");
                Ok(HostHint::Remote(peer.to_string()))
            }
            concrete => Ok(concrete.clone()),
        }
    }

    /// Builds the engine endpoint for a concrete hint.
    pub fn endpoint(&self, host: &HostHint) -> Endpoint {
        match host {
            HostHint::Remote(h) => Endpoint::Remote {
                host: h.clone(),
                url: self.config.remote_endpoint(h),
            },
            HostHint::Local | HostHint::AnyPeer => {
                Endpoint::Local(self.config.local_endpoint().to_string())
            }
        }
    }

    /// Resolves `requested`, connects to its engine and pings it.
    ///
    /// Returns the connection and the concrete host it points at.
    pub async fn resolve_and_connect(
        &self,
        requested: &HostHint,
    ) -> Result<(Arc<dyn Engine>, HostHint), DriverError> {
        let host = self.resolve(requested)?;
        let endpoint = self.endpoint(&host);

        let unreachable = |source| DriverError::HostUnreachable {
            host: host.to_string(),
            source,
        };

        let engine = self
            .connector
            .connect(&endpoint)
            .await
            .map_err(unreachable)?;
        engine.ping().await.map_err(unreachable)?;

        tracing::debug!(host = %host, endpoint = ?endpoint, "Connected to Docker engine");
        Ok((engine, host))
    }
}
