//! In-memory engine used by unit tests.
//!
//! A `MockCluster` holds one simulated engine per host string. Every
//! connection made through it shares the same state, so tests can observe
//! what a sequence of driver calls did to each host.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::execution::engine::{
    Connector, ContainerInfo, ContainerSpec, Endpoint, Engine, LogStream, RestartPolicy,
};
use crate::execution::resolver::LocalAddresses;
use crate::execution::task::Volume;

/// Fixed set of local addresses.
pub struct StaticInterfaces(HashSet<String>);

impl StaticInterfaces {
    pub fn new(addrs: &[&str]) -> Self {
        Self(addrs.iter().map(|a| a.to_string()).collect())
    }
}

impl LocalAddresses for StaticInterfaces {
    fn local_addresses(&self) -> Result<HashSet<String>, EngineError> {
        Ok(self.0.clone())
    }
}

/// Scripted result of running a container.
#[derive(Debug, Clone)]
pub struct Script {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

/// Flags a container removal was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub id: String,
    pub force: bool,
    pub remove_volumes: bool,
}

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub name: String,
    pub spec: ContainerSpec,
    pub running: bool,
    pub exited: bool,
    stdout: String,
    stderr: String,
    exit_code: i64,
}

#[derive(Debug, Default)]
struct HostState {
    down: bool,
    containers: BTreeMap<String, MockContainer>,
    volumes: HashMap<String, Volume>,
    images: HashSet<String>,
}

#[derive(Default)]
struct State {
    hosts: HashMap<String, HostState>,
    next_id: u64,
    connected: Vec<String>,
    calls: Vec<String>,
    removals: Vec<Removal>,
    failures: HashSet<&'static str>,
    unpullable: HashSet<String>,
    sticky_volumes: HashSet<String>,
    hanging: HashSet<String>,
    scripts: HashMap<String, Script>,
}

/// Simulated cluster of engines keyed by host string ("" is local).
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<State>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().expect("lock poisoned");
        f(&mut state)
    }

    /// Makes pings to `host` fail.
    pub fn set_down(&self, host: &str) {
        self.with(|s| s.hosts.entry(host.to_string()).or_default().down = true);
    }

    /// Makes the named engine operation fail with an API error.
    pub fn fail_on(&self, op: &'static str) {
        self.with(|s| s.failures.insert(op));
    }

    /// Makes pulls of `image:tag` fail.
    pub fn unpullable(&self, image_ref: &str) {
        self.with(|s| s.unpullable.insert(image_ref.to_string()));
    }

    /// Makes removal of the volume report success without removing it.
    pub fn sticky_volume(&self, name: &str) {
        self.with(|s| s.sticky_volumes.insert(name.to_string()));
    }

    /// Makes waits on the named container never return.
    pub fn hang(&self, container_name: &str) {
        self.with(|s| s.hanging.insert(container_name.to_string()));
    }

    /// Sets the output and exit code of the named container.
    pub fn script(&self, container_name: &str, stdout: &str, stderr: &str, exit_code: i64) {
        self.with(|s| {
            s.scripts.insert(
                container_name.to_string(),
                Script {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_code,
                },
            )
        });
    }

    /// Adds a volume to a host.
    pub fn add_volume(&self, host: &str, name: &str, driver: &str) {
        self.with(|s| {
            s.hosts.entry(host.to_string()).or_default().volumes.insert(
                name.to_string(),
                Volume {
                    driver: driver.to_string(),
                    size: None,
                },
            )
        });
    }

    /// Hosts connected to, in order.
    pub fn connected_hosts(&self) -> Vec<String> {
        self.with(|s| s.connected.clone())
    }

    /// Engine operations issued, as "host op" strings, in order.
    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Container removals that reached an engine, in order.
    pub fn removals(&self) -> Vec<Removal> {
        self.with(|s| s.removals.clone())
    }

    /// Returns the container with the given name on a host.
    pub fn container(&self, host: &str, name: &str) -> Option<MockContainer> {
        self.with(|s| {
            s.hosts
                .get(host)?
                .containers
                .values()
                .find(|c| c.name == name)
                .cloned()
        })
    }

    pub fn container_count(&self, host: &str) -> usize {
        self.with(|s| s.hosts.get(host).map_or(0, |h| h.containers.len()))
    }

    pub fn has_volume(&self, host: &str, name: &str) -> bool {
        self.with(|s| s.hosts.get(host).is_some_and(|h| h.volumes.contains_key(name)))
    }

    /// Creates a stopped container directly on a host, bypassing the driver.
    pub fn seed_container(&self, host: &str, name: &str) -> String {
        self.with(|s| {
            s.next_id += 1;
            let id = format!("seed{:04}", s.next_id);
            let spec = ContainerSpec {
                name: name.to_string(),
                image: "alpine:latest".to_string(),
                cmd: Vec::new(),
                binds: Vec::new(),
                volume_driver: "local".to_string(),
                restart_policy: RestartPolicy::No,
                attach_stdout: true,
                attach_stderr: true,
            };
            s.hosts.entry(host.to_string()).or_default().containers.insert(
                id.clone(),
                MockContainer {
                    name: name.to_string(),
                    spec,
                    running: false,
                    exited: true,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: 0,
                },
            );
            id
        })
    }
}

#[async_trait]
impl Connector for MockCluster {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Engine>, EngineError> {
        let host = endpoint.host().to_string();
        self.with(|s| s.connected.push(host.clone()));
        Ok(Arc::new(MockEngine {
            host,
            cluster: self.clone(),
        }))
    }
}

/// Connection to one simulated host.
pub struct MockEngine {
    host: String,
    cluster: MockCluster,
}

impl MockEngine {
    /// Records the call, applies fault injection, then runs `f` on the host.
    fn op<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut HostState, &mut State) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.cluster.with(|s| {
            s.calls.push(format!("{} {}", self.host, op));
            if s.failures.contains(op) {
                return Err(EngineError::Api {
                    status: 500,
                    message: format!("injected {op} failure"),
                });
            }
            let mut host = s.hosts.remove(&self.host).unwrap_or_default();
            let result = f(&mut host, s);
            s.hosts.insert(self.host.clone(), host);
            result
        })
    }

    fn is_hanging(&self, id: &str) -> bool {
        self.cluster.with(|s| {
            s.hosts
                .get(&self.host)
                .and_then(|h| h.containers.get(id))
                .is_some_and(|c| s.hanging.contains(&c.name))
        })
    }
}

fn missing(id: &str) -> EngineError {
    EngineError::NotFound(format!("No such container: {id}"))
}

/// Output of a container that was not scripted: `echo` prints its arguments.
fn default_script(cmd: &[String]) -> Script {
    match cmd.split_first() {
        Some((prog, args)) if prog == "echo" => Script {
            stdout: format!("{}\n", args.join(" ")),
            stderr: String::new(),
            exit_code: 0,
        },
        _ => Script {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        },
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.op("ping", |host, _| {
            if host.down {
                Err(EngineError::Unreachable("connection refused".to_string()))
            } else {
                Ok(())
            }
        })
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), EngineError> {
        let image_ref = format!("{image}:{tag}");
        self.op("pull", |host, s| {
            if s.unpullable.contains(&image_ref) {
                return Err(EngineError::NotFound(format!(
                    "pull access denied for {image}"
                )));
            }
            host.images.insert(image_ref);
            Ok(())
        })
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.op("create", |host, s| {
            if !host.images.contains(&spec.image) {
                return Err(EngineError::NotFound(format!("No such image: {}", spec.image)));
            }
            if host.containers.values().any(|c| c.name == spec.name) {
                return Err(EngineError::Api {
                    status: 409,
                    message: format!("Conflict. The container name \"/{}\" is already in use", spec.name),
                });
            }
            for bind in &spec.binds {
                if let Some((volume, _)) = bind.split_once(':') {
                    host.volumes.entry(volume.to_string()).or_insert(Volume {
                        driver: spec.volume_driver.clone(),
                        size: None,
                    });
                }
            }

            s.next_id += 1;
            let id = format!("{:012x}", s.next_id);
            let script = s
                .scripts
                .get(&spec.name)
                .cloned()
                .unwrap_or_else(|| default_script(&spec.cmd));
            host.containers.insert(
                id.clone(),
                MockContainer {
                    name: spec.name.clone(),
                    spec: spec.clone(),
                    running: false,
                    exited: false,
                    stdout: script.stdout,
                    stderr: script.stderr,
                    exit_code: script.exit_code,
                },
            );
            Ok(id)
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.op("start", |host, _| {
            let container = host.containers.get_mut(id).ok_or_else(|| missing(id))?;
            if container.running {
                return Err(EngineError::Api {
                    status: 304,
                    message: "container already started".to_string(),
                });
            }
            container.running = true;
            Ok(())
        })
    }

    async fn stop_container(&self, id: &str, _timeout_secs: i64) -> Result<(), EngineError> {
        self.op("stop", |host, _| {
            let container = host.containers.get_mut(id).ok_or_else(|| missing(id))?;
            if !container.running {
                return Err(EngineError::NotRunning(id.to_string()));
            }
            container.running = false;
            container.exited = true;
            Ok(())
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        if self.is_hanging(id) {
            self.op("wait", |_, _| Ok(()))?;
            futures::future::pending::<()>().await;
        }
        self.op("wait", |host, _| {
            let container = host.containers.get_mut(id).ok_or_else(|| missing(id))?;
            container.running = false;
            container.exited = true;
            Ok(container.exit_code)
        })
    }

    async fn logs(&self, id: &str, stream: LogStream) -> Result<String, EngineError> {
        let op = match stream {
            LogStream::Stdout => "logs-stdout",
            LogStream::Stderr => "logs-stderr",
        };
        self.op(op, |host, _| {
            let container = host.containers.get(id).ok_or_else(|| missing(id))?;
            if !container.exited {
                return Ok(String::new());
            }
            Ok(match stream {
                LogStream::Stdout => container.stdout.clone(),
                LogStream::Stderr => container.stderr.clone(),
            })
        })
    }

    async fn list_containers(&self) -> Result<Vec<String>, EngineError> {
        self.op("list", |host, _| Ok(host.containers.keys().cloned().collect()))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, EngineError> {
        self.op("inspect", |host, _| {
            let container = host.containers.get(id).ok_or_else(|| missing(id))?;
            Ok(ContainerInfo {
                id: id.to_string(),
                name: format!("/{}", container.name),
            })
        })
    }

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<(), EngineError> {
        self.op("remove", |host, s| {
            s.removals.push(Removal {
                id: id.to_string(),
                force,
                remove_volumes,
            });
            let container = host.containers.get(id).ok_or_else(|| missing(id))?;
            if container.running && !force {
                return Err(EngineError::Api {
                    status: 409,
                    message: "cannot remove a running container".to_string(),
                });
            }
            host.containers.remove(id);
            Ok(())
        })
    }

    async fn inspect_volume(&self, name: &str) -> Result<Volume, EngineError> {
        self.op("inspect-volume", |host, _| {
            host.volumes
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("no such volume: {name}")))
        })
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        self.op("remove-volume", |host, s| {
            if !host.volumes.contains_key(name) {
                return Err(EngineError::NotFound(format!("no such volume: {name}")));
            }
            if s.sticky_volumes.contains(name) {
                return Ok(());
            }
            let in_use = host
                .containers
                .values()
                .any(|c| c.spec.binds.iter().any(|b| b.split(':').next() == Some(name)));
            if in_use {
                return Err(EngineError::Api {
                    status: 409,
                    message: format!("volume is in use: {name}"),
                });
            }
            host.volumes.remove(name);
            Ok(())
        })
    }
}
