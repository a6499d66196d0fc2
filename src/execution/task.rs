//! Task descriptors and host hints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reserved host string meaning "any cluster member other than this machine".
pub const EXTERNAL_HOST: &str = "external";

/// Where a task should run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum HostHint {
    /// The local engine (empty host string).
    #[default]
    Local,
    /// A concrete host address.
    Remote(String),
    /// Any cluster member that is not one of this machine's addresses.
    AnyPeer,
}

impl HostHint {
    /// Creates a hint from its string form.
    ///
    /// A blank string is the local engine. Any other string except the
    /// wildcard is kept verbatim as the host to target.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return HostHint::Local;
        }
        match raw {
            EXTERNAL_HOST => HostHint::AnyPeer,
            host => HostHint::Remote(host.to_string()),
        }
    }

    /// Returns true for the wildcard hint.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, HostHint::AnyPeer)
    }
}

impl fmt::Display for HostHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostHint::Local => Ok(()),
            HostHint::Remote(host) => write!(f, "{}", host),
            HostHint::AnyPeer => write!(f, "{}", EXTERNAL_HOST),
        }
    }
}

impl FromStr for HostHint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HostHint::parse(s))
    }
}

impl From<String> for HostHint {
    fn from(s: String) -> Self {
        HostHint::parse(&s)
    }
}

impl From<&str> for HostHint {
    fn from(s: &str) -> Self {
        HostHint::parse(s)
    }
}

impl From<HostHint> for String {
    fn from(hint: HostHint) -> Self {
        hint.to_string()
    }
}

/// Volume binding for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume name on the engine.
    pub name: String,
    /// Mount point inside the container.
    pub mount_path: String,
    /// Volume driver (e.g. "local").
    pub driver: String,
}

impl VolumeSpec {
    pub fn new(
        name: impl Into<String>,
        mount_path: impl Into<String>,
        driver: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            driver: driver.into(),
        }
    }

    /// Returns the engine bind string, `name:mount_path`.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.name, self.mount_path)
    }
}

/// Parses `name:mount_path[:driver]`, defaulting the driver to "local".
impl FromStr for VolumeSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [name, path] if !name.is_empty() && !path.is_empty() => {
                Ok(VolumeSpec::new(*name, *path, "local"))
            }
            [name, path, driver]
                if !name.is_empty() && !path.is_empty() && !driver.is_empty() =>
            {
                Ok(VolumeSpec::new(*name, *path, *driver))
            }
            _ => Err(format!(
                "invalid volume '{}', expected name:mount_path[:driver]",
                s
            )),
        }
    }
}

/// An immutable description of work to run as a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Requested host.
    pub host_hint: HostHint,
    /// Image repository (e.g. "alpine").
    pub image: String,
    /// Image tag (e.g. "latest").
    pub tag: String,
    /// Command and arguments.
    pub command: Vec<String>,
    /// Container name, unique among live containers on a host.
    pub name: String,
    /// Volume bound into the container.
    pub volume: VolumeSpec,
}

impl Task {
    /// Creates a task for the local engine with tag "latest" and no command.
    pub fn new(name: impl Into<String>, image: impl Into<String>, volume: VolumeSpec) -> Self {
        Self {
            host_hint: HostHint::Local,
            image: image.into(),
            tag: "latest".to_string(),
            command: Vec::new(),
            name: name.into(),
            volume,
        }
    }

    /// Sets the requested host.
    pub fn with_host(mut self, host: impl Into<HostHint>) -> Self {
        self.host_hint = host.into();
        self
    }

    /// Sets the image tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the command to run.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Returns `image:tag`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// Volume details reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub driver: String,
    /// Size in bytes, when the engine reports usage data.
    pub size: Option<i64>,
}
