//! CLI command definitions for dockrun.
//!
//! Each subcommand maps onto one or two driver operations and prints the
//! result, as plain text or as JSON with `--json`.

use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{parse_nodes, ClusterConfig, CLUSTER_NODES_ENV, DOCKER_HOST_ENV};
use crate::error::DriverError;
use crate::execution::{Driver, ExecutionContext, HostHint, Task, TaskState, VolumeSpec};

/// Run one-shot container tasks across a cluster of Docker hosts.
#[derive(Parser)]
#[command(name = "dockrun")]
#[command(about = "Run one-shot container tasks across a cluster of Docker hosts")]
#[command(version)]
#[command(
    long_about = "dockrun runs a command in a fresh container on a Docker host, waits for it to exit and prints its output.\n\nExample usage:\n  CLUSTER_NODES=10.0.0.1,10.0.0.2 dockrun --host external run --name t1 --volume v1:/data alpine -- echo hi"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Host to act on: empty for the local engine, an address, or "external"
    /// for any cluster member other than this machine.
    #[arg(long, default_value = "", global = true)]
    pub host: String,

    /// Comma-separated cluster member addresses.
    #[arg(long, env = CLUSTER_NODES_ENV, default_value = "", global = true)]
    pub nodes: String,

    /// Local engine endpoint override.
    #[arg(long, env = DOCKER_HOST_ENV, global = true)]
    pub docker_host: Option<String>,

    /// Docker engine port on remote hosts.
    #[arg(long, default_value = "2375", global = true)]
    pub engine_port: u16,

    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a container, run it to completion and print its output.
    Run(RunArgs),

    /// Stop and remove the container with the given name.
    Destroy {
        /// Container name.
        name: String,
    },

    /// List the configured cluster members.
    Nodes,

    /// Inspect or delete volumes.
    #[command(subcommand)]
    Volume(VolumeCommand),
}

/// Arguments for `dockrun run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Container name; must be unique on the target host.
    #[arg(short, long)]
    pub name: String,

    /// Volume binding, as name:mount_path[:driver].
    #[arg(short, long)]
    pub volume: VolumeSpec,

    /// Image tag.
    #[arg(short, long, default_value = "latest")]
    pub tag: String,

    /// Keep the container after it exits.
    #[arg(long)]
    pub keep: bool,

    /// Give up waiting after this many seconds. The container keeps running.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Image repository.
    pub image: String,

    /// Command and arguments.
    #[arg(last = true)]
    pub command: Vec<String>,
}

/// Volume subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum VolumeCommand {
    /// Show a volume's driver and size.
    Inspect { name: String },

    /// Delete a volume and verify that it is gone.
    Rm { name: String },
}

#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    id: &'a str,
    host: String,
    state: TaskState,
    status: Option<i64>,
    stdout: &'a str,
    stderr: &'a str,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = cluster_config(&cli);
    let driver = Driver::docker(config);
    driver.init();

    let host = HostHint::parse(&cli.host);

    match cli.command {
        Commands::Run(args) => run_task_command(&driver, host, args, cli.json).await,
        Commands::Destroy { name } => {
            driver.destroy_by_name(&host, &name).await?;
            info!(task = %name, "Destroyed");
            Ok(())
        }
        Commands::Nodes => {
            let nodes = driver.get_nodes();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for node in nodes {
                    println!("{node}");
                }
            }
            Ok(())
        }
        Commands::Volume(VolumeCommand::Inspect { name }) => {
            let volume = driver.inspect_volume(&host, &name).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&volume)?);
            } else {
                let size = volume
                    .size
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("driver: {}\nsize: {}", volume.driver, size);
            }
            Ok(())
        }
        Commands::Volume(VolumeCommand::Rm { name }) => {
            driver.delete_volume(&host, &name).await?;
            info!(volume = %name, "Deleted volume");
            Ok(())
        }
    }
}

fn cluster_config(cli: &Cli) -> ClusterConfig {
    let mut config = ClusterConfig::new(parse_nodes(&cli.nodes)).with_engine_port(cli.engine_port);
    if let Some(endpoint) = cli.docker_host.as_deref().filter(|e| !e.trim().is_empty()) {
        config = config.with_local_endpoint(endpoint);
    }
    config
}

async fn run_task_command(
    driver: &Driver,
    host: HostHint,
    args: RunArgs,
    json: bool,
) -> anyhow::Result<()> {
    let task = Task::new(&args.name, &args.image, args.volume)
        .with_host(host)
        .with_tag(&args.tag)
        .with_command(args.command);

    let mut ctx = driver.create(&task).await?;
    info!(container = %ctx.id, host = %ctx.task.host_hint, "Created task");

    let timeout = args.timeout.map(Duration::from_secs);
    let outcome = execute_task(driver, &mut ctx, timeout).await;

    if json {
        let output = RunOutput {
            id: &ctx.id,
            host: ctx.task.host_hint.to_string(),
            state: ctx.state(),
            status: ctx.status,
            stdout: &ctx.stdout,
            stderr: &ctx.stderr,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", ctx.stdout);
        eprint!("{}", ctx.stderr);
    }

    cleanup_task(driver, &mut ctx, args.keep, &outcome).await;

    outcome?;
    if let Some(status) = ctx.status.filter(|s| *s != 0) {
        anyhow::bail!("Task '{}' exited with status {}", ctx.task.name, status);
    }
    Ok(())
}

/// Starts a created task and waits for it, optionally with a deadline.
async fn execute_task(
    driver: &Driver,
    ctx: &mut ExecutionContext,
    timeout: Option<Duration>,
) -> Result<(), DriverError> {
    driver.start(ctx).await?;
    match timeout {
        Some(deadline) => driver.wait_done_with_deadline(ctx, deadline).await,
        None => driver.wait_done(ctx).await,
    }
}

/// Destroys the task's container unless it should be kept.
///
/// Failed starts and failed waits are cleaned up too. An aborted wait leaves
/// the container running, so it is kept for inspection.
async fn cleanup_task(
    driver: &Driver,
    ctx: &mut ExecutionContext,
    keep: bool,
    outcome: &Result<(), DriverError>,
) {
    if keep || matches!(outcome, Err(DriverError::Aborted { .. })) {
        return;
    }
    if let Err(e) = driver.destroy(ctx).await {
        warn!(container = %ctx.id, error = %e, "Failed to destroy task");
    }
}
