//! dockwire - inspect and drive a local Docker daemon.
//!
//! ```bash
//! dockwire ps -a --group
//! dockwire logs web -f --tail 50
//! dockwire events --type container
//! ```

use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use dockwire_core::{
    ClientConfig, ClientError, DockerClient, DockerEvent, EventFilters, LogLine, RemoveOptions,
    StreamCallbacks, StreamHandle, Target,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod output;

#[derive(Parser, Debug)]
#[command(
    name = "dockwire",
    about = "Talk to the Docker Engine API over its Unix socket",
    propagate_version = true,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon endpoint, e.g. unix:///var/run/docker.sock or tcp://127.0.0.1:2375
    #[arg(long, global = true, env = "DOCKWIRE_HOST")]
    host: Option<String>,

    /// Raise log verbosity (repeatable)
    #[arg(long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List containers
    Ps {
        /// Include stopped containers
        #[arg(short, long)]
        all: bool,
        /// Group by compose project
        #[arg(long)]
        group: bool,
    },
    /// List images
    Images {
        /// Include intermediate images
        #[arg(short, long)]
        all: bool,
    },
    /// Show container details as JSON
    Inspect { id: String },
    Start { id: String },
    Stop {
        id: String,
        /// Seconds to wait before killing
        #[arg(short, long)]
        time: Option<u32>,
    },
    Restart {
        id: String,
        #[arg(short, long)]
        time: Option<u32>,
    },
    /// Remove a container
    Rm {
        id: String,
        #[arg(short, long)]
        force: bool,
        /// Remove anonymous volumes too
        #[arg(short, long)]
        volumes: bool,
    },
    /// Remove an image
    Rmi {
        id: String,
        #[arg(short, long)]
        force: bool,
    },
    /// Show disk usage
    Df,
    /// Print container logs
    Logs {
        id: String,
        #[arg(short, long)]
        follow: bool,
        /// Number of lines from the end, or "all"
        #[arg(long)]
        tail: Option<String>,
        #[arg(short, long)]
        timestamps: bool,
    },
    /// Stream daemon events
    Events {
        #[arg(long)]
        container: Option<String>,
        #[arg(long = "type")]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "dockwire=info",
        1 => "dockwire=debug",
        _ => "dockwire=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let mut config = ClientConfig::from_env();
    if let Some(host) = &cli.host {
        config = config.with_target(Target::parse(host));
    }
    config.validate_warn();
    tracing::debug!(target_addr = %config.target, "Using daemon");

    let client = DockerClient::from_config(&config);

    if let Err(e) = run(&client, cli.command).await {
        tracing::debug!("Command failed: {:?}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(client: &DockerClient, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ps { all, group } => {
            let containers = client.list_containers(all).await?;
            if group {
                println!("{}", output::containers_grouped(&containers));
            } else {
                println!("{}", output::containers(&containers));
            }
        }
        Commands::Images { all } => {
            println!("{}", output::images(&client.list_images(all).await?));
        }
        Commands::Inspect { id } => {
            let details = client.container_details(&id).await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Commands::Start { id } => {
            client.start_container(&id).await?;
            println!("{id}");
        }
        Commands::Stop { id, time } => {
            client.stop_container(&id, time).await?;
            println!("{id}");
        }
        Commands::Restart { id, time } => {
            client.restart_container(&id, time).await?;
            println!("{id}");
        }
        Commands::Rm { id, force, volumes } => {
            client
                .remove_container(&id, RemoveOptions { force, volumes })
                .await?;
            println!("{id}");
        }
        Commands::Rmi { id, force } => {
            for item in client.remove_image(&id, force, false).await? {
                if let Some(tag) = item.untagged {
                    println!("Untagged: {tag}");
                }
                if let Some(digest) = item.deleted {
                    println!("Deleted: {digest}");
                }
            }
        }
        Commands::Df => {
            let df = client.disk_usage().await?;
            let summary = dockwire_core::DiskUsageSummary::from_df(&df);
            println!("{}", output::disk_usage(&summary));
        }
        Commands::Logs {
            id,
            follow,
            tail,
            timestamps,
        } => {
            let mut options = client.log_options().timestamps(timestamps);
            if let Some(tail) = tail {
                options = options.tail(tail);
            }
            if follow {
                let failure = Failure::default();
                let callbacks =
                    StreamCallbacks::new(|line: LogLine| println!("{}", line.text))
                        .on_error(failure.recorder());
                let handle = client
                    .stream_container_logs(&id, &options, callbacks)
                    .await?;
                wait(handle).await;
                failure.into_result()?;
            } else {
                print!("{}", client.container_logs(&id, &options).await?);
            }
        }
        Commands::Events { container, kind } => {
            let mut filters = EventFilters::new();
            if let Some(container) = container {
                filters = filters.container(container);
            }
            if let Some(kind) = kind {
                filters = filters.event_type(kind);
            }
            let failure = Failure::default();
            let callbacks =
                StreamCallbacks::new(|event: DockerEvent| println!("{}", output::event(&event)))
                    .on_error(failure.recorder());
            let handle = client
                .stream_events(&filters, callbacks)
                .await
                .context("Could not subscribe to events")?;
            wait(handle).await;
            failure.into_result()?;
        }
    }
    Ok(())
}

/// Run until the stream closes or the user interrupts.
async fn wait(handle: StreamHandle) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("Interrupted, cancelling stream");
            handle.cancel();
        }
        _ = handle.closed() => {}
    }
}

/// Holds the error a stream reported after it was established.
#[derive(Default, Clone)]
struct Failure(Arc<Mutex<Option<ClientError>>>);

impl Failure {
    fn recorder(&self) -> impl FnOnce(ClientError) + Send + 'static {
        let slot = Arc::clone(&self.0);
        move |e| {
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(e);
            }
        }
    }

    fn into_result(self) -> Result<(), ClientError> {
        match self.0.lock().ok().and_then(|mut slot| slot.take()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_logs_follow() {
        let cli = Cli::try_parse_from(["dockwire", "logs", "web", "-f", "--tail", "20"]).unwrap();
        match cli.command {
            Commands::Logs {
                id, follow, tail, ..
            } => {
                assert_eq!(id, "web");
                assert!(follow);
                assert_eq!(tail.as_deref(), Some("20"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_host() {
        let cli =
            Cli::try_parse_from(["dockwire", "ps", "-a", "--host", "tcp://127.0.0.1:2375"])
                .unwrap();
        assert_eq!(cli.host.as_deref(), Some("tcp://127.0.0.1:2375"));
        assert!(matches!(cli.command, Commands::Ps { all: true, group: false }));
    }

    #[test]
    fn test_parse_events_type() {
        let cli = Cli::try_parse_from(["dockwire", "events", "--type", "container"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Events { kind: Some(ref k), container: None } if k == "container"
        ));
    }

    #[test]
    fn test_rm_flags() {
        assert!(Cli::try_parse_from(["dockwire", "rm"]).is_err());
        let cli = Cli::try_parse_from(["dockwire", "rm", "web", "-f", "-v"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rm { force: true, volumes: true, .. }
        ));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_failure_records_first_error() {
        let failure = Failure::default();
        let cause = serde_json::from_str::<u32>("nope").unwrap_err();
        (failure.recorder())(ClientError::Operation {
            verb: "stream",
            resource: "events",
            id: String::new(),
            cause: cause.into(),
        });
        assert!(failure.clone().into_result().is_err());
        assert!(failure.into_result().is_ok());
    }
}
