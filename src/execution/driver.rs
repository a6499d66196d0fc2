//! Lifecycle driver for one-shot container tasks.
//!
//! Every operation resolves and connects afresh, issues its engine calls in
//! order and stops at the first failure. Nothing is retried and nothing is
//! cleaned up on failure: a task whose start failed still has a container
//! until the caller destroys it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClusterConfig;
use crate::error::{DriverError, EngineError, Stage};
use crate::execution::context::{ExecutionContext, TaskState};
use crate::execution::docker_client::DockerConnector;
use crate::execution::engine::{Connector, ContainerSpec, Engine, LogStream, RestartPolicy};
use crate::execution::resolver::{HostResolver, LocalAddresses, SystemInterfaces};
use crate::execution::task::{HostHint, Task, Volume};

/// Seconds a container is given to stop before being killed.
const STOP_TIMEOUT_SECS: i64 = 0;

/// Runs tasks as containers on cluster hosts.
///
/// Holds only immutable configuration; share it with `Arc` to drive many
/// tasks concurrently.
pub struct Driver {
    resolver: HostResolver,
}

impl Driver {
    /// Creates a driver that talks to Docker engines.
    pub fn docker(config: ClusterConfig) -> Self {
        let connector = DockerConnector::new(config.connect_timeout_secs);
        Self::with_parts(config, Arc::new(connector), Arc::new(SystemInterfaces))
    }

    /// Creates a driver from explicit engine and interface sources.
    pub fn with_parts(
        config: ClusterConfig,
        connector: Arc<dyn Connector>,
        interfaces: Arc<dyn LocalAddresses>,
    ) -> Self {
        Self {
            resolver: HostResolver::new(Arc::new(config), connector, interfaces),
        }
    }

    /// Logs the driver and cluster membership.
    pub fn init(&self) {
        tracing::info!("Using the Docker scheduler driver");
        tracing::info!(nodes = ?self.resolver.nodes(), "Cluster hosts");
    }

    /// Returns the cluster membership set.
    pub fn get_nodes(&self) -> Vec<String> {
        self.resolver.nodes().to_vec()
    }

    /// Resolves a host and returns a live engine connection to it.
    pub async fn connect(
        &self,
        host: &HostHint,
    ) -> Result<(Arc<dyn Engine>, HostHint), DriverError> {
        self.resolver.resolve_and_connect(host).await
    }

    /// Pulls the task's image and creates its container.
    ///
    /// The returned context carries the concrete host the container lives on.
    pub async fn create(&self, task: &Task) -> Result<ExecutionContext, DriverError> {
        let (engine, host) = self.resolver.resolve_and_connect(&task.host_hint).await?;

        engine
            .pull_image(&task.image, &task.tag)
            .await
            .map_err(|source| DriverError::ImagePullFailed {
                image: task.image_ref(),
                source,
            })?;

        let spec = container_spec(task);
        let id = engine
            .create_container(&spec)
            .await
            .map_err(|source| DriverError::ContainerCreateFailed {
                name: task.name.clone(),
                source,
            })?;

        tracing::debug!(container = %id, task = %task.name, host = %host, "Created container");

        let mut task = task.clone();
        task.host_hint = host;
        Ok(ExecutionContext::new(task, id))
    }

    /// Starts a created container on the host it was created on.
    ///
    /// An engine "already started" response is returned as an error.
    pub async fn start(&self, ctx: &mut ExecutionContext) -> Result<(), DriverError> {
        let engine = self.reconnect(ctx, Stage::Start).await?;

        if let Err(source) = engine.start_container(&ctx.id).await {
            // 304: the container is already running.
            let state = match source {
                EngineError::Api { status: 304, .. } => TaskState::Running,
                _ => TaskState::Failed,
            };
            ctx.set_state(state);
            return Err(op_failed(ctx, Stage::Start, source));
        }

        ctx.set_state(TaskState::Running);
        tracing::debug!(container = %ctx.id, task = %ctx.task.name, "Started container");
        Ok(())
    }

    /// Starts the container, waits for it to exit and captures its output.
    pub async fn run(&self, ctx: &mut ExecutionContext) -> Result<(), DriverError> {
        self.start(ctx).await?;
        self.wait_done(ctx).await
    }

    /// Waits for a started container to exit and captures its output.
    ///
    /// Blocks for as long as the container runs. The exit status is recorded
    /// before the logs are read, so it survives a failed log capture.
    pub async fn wait_done(&self, ctx: &mut ExecutionContext) -> Result<(), DriverError> {
        let engine = self.reconnect(ctx, Stage::Wait).await?;

        let status = match engine.wait_container(&ctx.id).await {
            Ok(status) => status,
            Err(source) => {
                ctx.set_state(TaskState::Failed);
                return Err(op_failed(ctx, Stage::Wait, source));
            }
        };
        ctx.status = Some(status);

        let captured = capture_logs(engine.as_ref(), &ctx.id).await;
        match captured {
            Ok((stdout, stderr)) => {
                ctx.stdout = stdout;
                ctx.stderr = stderr;
                ctx.set_state(TaskState::Completed);
                tracing::debug!(container = %ctx.id, status, "Container exited");
                Ok(())
            }
            Err((stage, source)) => {
                ctx.set_state(TaskState::Failed);
                Err(op_failed(ctx, stage, source))
            }
        }
    }

    /// Like `wait_done`, but gives up once `cancel` resolves.
    ///
    /// Giving up does not stop the container; the context is left as it was.
    pub async fn wait_done_until<F>(
        &self,
        ctx: &mut ExecutionContext,
        cancel: F,
    ) -> Result<(), DriverError>
    where
        F: Future<Output = ()>,
    {
        let id = ctx.id.clone();
        let mut scratch = ctx.clone();

        tokio::select! {
            result = self.wait_done(&mut scratch) => {
                *ctx = scratch;
                result
            }
            _ = cancel => {
                tracing::warn!(container = %id, "Wait aborted, container state unknown");
                Err(DriverError::Aborted { id })
            }
        }
    }

    /// Like `wait_done`, but gives up after `deadline`.
    pub async fn wait_done_with_deadline(
        &self,
        ctx: &mut ExecutionContext,
        deadline: Duration,
    ) -> Result<(), DriverError> {
        self.wait_done_until(ctx, tokio::time::sleep(deadline)).await
    }

    /// Force-removes the container and its volumes.
    ///
    /// After success the context can no longer be used.
    pub async fn destroy(&self, ctx: &mut ExecutionContext) -> Result<(), DriverError> {
        let engine = self.reconnect(ctx, Stage::Remove).await?;

        engine
            .remove_container(&ctx.id, true, true)
            .await
            .map_err(|source| op_failed(ctx, Stage::Remove, source))?;

        ctx.set_state(TaskState::Destroyed);
        tracing::info!(task = %ctx.task.name, "Deleted task");
        Ok(())
    }

    /// Stops and removes the container named `name` on `host`, if one exists.
    ///
    /// A container that is already stopped, or no container at all, is not
    /// an error.
    pub async fn destroy_by_name(&self, host: &HostHint, name: &str) -> Result<(), DriverError> {
        let (engine, _) = self.resolver.resolve_and_connect(host).await?;

        let id = match find_by_name(engine.as_ref(), name).await? {
            Some(id) => id,
            None => {
                tracing::debug!(task = %name, "No container with that name");
                return Ok(());
            }
        };

        match engine.stop_container(&id, STOP_TIMEOUT_SECS).await {
            Ok(()) | Err(EngineError::NotRunning(_)) => {}
            Err(source) => {
                tracing::warn!(task = %name, error = %source, "Error while stopping task");
                return Err(DriverError::ContainerOperationFailed {
                    id,
                    stage: Stage::Stop,
                    source,
                });
            }
        }

        if let Err(source) = engine.remove_container(&id, true, true).await {
            tracing::warn!(task = %name, error = %source, "Error while removing task");
            return Err(DriverError::ContainerOperationFailed {
                id,
                stage: Stage::Remove,
                source,
            });
        }

        tracing::info!(task = %name, "Deleted task");
        Ok(())
    }

    /// Returns the driver and size of a volume on `host`.
    pub async fn inspect_volume(&self, host: &HostHint, name: &str) -> Result<Volume, DriverError> {
        let (engine, _) = self.resolver.resolve_and_connect(host).await?;

        engine
            .inspect_volume(name)
            .await
            .map_err(|e| volume_failed(name, e.to_string()))
    }

    /// Removes a volume on `host` and checks that it is really gone.
    pub async fn delete_volume(&self, host: &HostHint, name: &str) -> Result<(), DriverError> {
        let (engine, _) = self.resolver.resolve_and_connect(host).await?;

        engine
            .remove_volume(name)
            .await
            .map_err(|e| volume_failed(name, e.to_string()))?;

        // Removal can report success without effect.
        match engine.inspect_volume(name).await {
            Err(EngineError::NotFound(_)) => Ok(()),
            Ok(_) => Err(volume_failed(name, "volume could not be deleted".to_string())),
            Err(e) => Err(volume_failed(
                name,
                format!("could not verify deletion: {e}"),
            )),
        }
    }

    /// Connects to the context's resolved host, rejecting destroyed contexts.
    async fn reconnect(
        &self,
        ctx: &ExecutionContext,
        stage: Stage,
    ) -> Result<Arc<dyn Engine>, DriverError> {
        if ctx.is_destroyed() {
            return Err(DriverError::ContainerDestroyed {
                id: ctx.id.clone(),
                stage,
            });
        }
        let (engine, _) = self.resolver.resolve_and_connect(&ctx.task.host_hint).await?;
        Ok(engine)
    }
}

/// Builds the engine container configuration for a task.
pub fn container_spec(task: &Task) -> ContainerSpec {
    ContainerSpec {
        name: task.name.clone(),
        image: task.image_ref(),
        cmd: task.command.clone(),
        binds: vec![task.volume.bind()],
        volume_driver: task.volume.driver.clone(),
        restart_policy: RestartPolicy::No,
        attach_stdout: true,
        attach_stderr: true,
    }
}

/// Reads stdout then stderr, as two separate full reads.
async fn capture_logs(
    engine: &dyn Engine,
    id: &str,
) -> Result<(String, String), (Stage, EngineError)> {
    let stdout = engine
        .logs(id, LogStream::Stdout)
        .await
        .map_err(|e| (Stage::StdoutLogs, e))?;
    let stderr = engine
        .logs(id, LogStream::Stderr)
        .await
        .map_err(|e| (Stage::StderrLogs, e))?;
    Ok((stdout, stderr))
}

/// Scans all containers for one whose display name is exactly `name`.
async fn find_by_name(engine: &dyn Engine, name: &str) -> Result<Option<String>, DriverError> {
    let ids = engine
        .list_containers()
        .await
        .map_err(|source| DriverError::ContainerOperationFailed {
            id: name.to_string(),
            stage: Stage::List,
            source,
        })?;

    for id in ids {
        let info = engine
            .inspect_container(&id)
            .await
            .map_err(|source| DriverError::ContainerOperationFailed {
                id: id.clone(),
                stage: Stage::Inspect,
                source,
            })?;
        if info.display_name() == name {
            return Ok(Some(info.id));
        }
    }

    Ok(None)
}

fn op_failed(ctx: &ExecutionContext, stage: Stage, source: EngineError) -> DriverError {
    DriverError::ContainerOperationFailed {
        id: ctx.id.clone(),
        stage,
        source,
    }
}

fn volume_failed(name: &str, reason: String) -> DriverError {
    DriverError::VolumeOperationFailed {
        name: name.to_string(),
        reason,
    }
}
