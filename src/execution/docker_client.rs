//! Docker API wrapper using the bollard crate.
//!
//! `DockerConnector` opens one `DockerClient` per call; `DockerClient`
//! implements the `Engine` trait on top of a bollard `Docker` handle.

use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, RestartPolicyNameEnum};
use bollard::volume::RemoveVolumeOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;

use crate::error::EngineError;
use crate::execution::engine::{
    Connector, ContainerInfo, ContainerSpec, Endpoint, Engine, LogStream, RestartPolicy,
};
use crate::execution::task::Volume;

/// Opens bollard connections to local or remote Docker engines.
#[derive(Debug, Clone)]
pub struct DockerConnector {
    timeout_secs: u64,
}

impl DockerConnector {
    /// Creates a connector applying the given request timeout.
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Connector for DockerConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Engine>, EngineError> {
        let docker = match endpoint {
            Endpoint::Local(url) if url.starts_with("unix://") => {
                Docker::connect_with_unix(url, self.timeout_secs, API_DEFAULT_VERSION)
            }
            Endpoint::Local(url) | Endpoint::Remote { url, .. } => {
                Docker::connect_with_http(url, self.timeout_secs, API_DEFAULT_VERSION)
            }
        }
        .map_err(|e| EngineError::Unreachable(format!("Failed to connect: {e}")))?;

        Ok(Arc::new(DockerClient::from_docker(docker)))
    }
}

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Maps a bollard error to an engine error, keeping 404s distinguishable.
fn engine_error(e: BollardError) -> EngineError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api {
            status: status_code,
            message,
        },
        other => EngineError::Transport(other.to_string()),
    }
}

fn host_config(spec: &ContainerSpec) -> HostConfig {
    let restart_policy = match spec.restart_policy {
        RestartPolicy::No => bollard::models::RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            maximum_retry_count: Some(0),
        },
    };

    HostConfig {
        binds: Some(spec.binds.clone()),
        volume_driver: Some(spec.volume_driver.clone()),
        restart_policy: Some(restart_policy),
        ..Default::default()
    }
}

#[async_trait]
impl Engine for DockerClient {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map_err(|e| EngineError::Unreachable(format!("Ping failed: {e}")))?;
        Ok(())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: image,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(engine_error)?;
        }

        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: if spec.cmd.is_empty() {
                None
            } else {
                Some(spec.cmd.clone())
            },
            attach_stdin: Some(false),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            tty: Some(false),
            host_config: Some(host_config(spec)),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(engine_error)?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(engine_error)
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), EngineError> {
        let options = StopContainerOptions { t: timeout_secs };

        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304 Not Modified: the container was already stopped.
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Err(EngineError::NotRunning(id.to_string())),
            Err(e) => Err(engine_error(e)),
        }
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(engine_error(e)),
            None => Err(EngineError::Transport(
                "Wait stream ended without a status".to_string(),
            )),
        }
    }

    async fn logs(&self, id: &str, stream: LogStream) -> Result<String, EngineError> {
        let options = LogsOptions::<String> {
            stdout: stream == LogStream::Stdout,
            stderr: stream == LogStream::Stderr,
            follow: false,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut output = String::new();

        while let Some(chunk) = logs.next().await {
            match chunk.map_err(engine_error)? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(output)
    }

    async fn list_containers(&self) -> Result<Vec<String>, EngineError> {
        let options = ListContainersOptions::<String> {
            all: true,
            size: false,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(engine_error)?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, EngineError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(engine_error)?;

        Ok(ContainerInfo {
            id: info.id.unwrap_or_else(|| id.to_string()),
            name: info.name.unwrap_or_default(),
        })
    }

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            v: remove_volumes,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(engine_error)
    }

    async fn inspect_volume(&self, name: &str) -> Result<Volume, EngineError> {
        let volume = self
            .docker
            .inspect_volume(name)
            .await
            .map_err(engine_error)?;

        Ok(Volume {
            driver: volume.driver,
            size: volume.usage_data.map(|usage| usage.size).filter(|s| *s >= 0),
        })
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(engine_error)
    }
}
