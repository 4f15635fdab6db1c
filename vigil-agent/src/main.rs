use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use vigil_agent::runtime::{AgentRuntime, recent_events};
use vigil_agent::telemetry::init_tracing;
use vigil_config::{ConfigLoad, ConfigLoader, ConfigLoaderOptions};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "vigil-agent", version)]
#[command(about = "File integrity monitoring agent")]
struct Cli {
    /// Path to vigil.toml (overrides VIGIL_CONFIG)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Environment file loaded before reading variables
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Watch the configured roots until interrupted (default)
    Run,
    /// Run one reconciliation sweep, report, and exit
    Scan,
    /// Print recently recorded changes, newest first
    Events {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ConfigLoad { config, warnings } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        env_file: cli.env_file.clone(),
        base_dir: None,
    })
    .load()
    .context("failed to load configuration")?;

    init_tracing(config.logging.file.as_deref())?;

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let runtime = AgentRuntime::bootstrap(config).await?;
            let stats = runtime.run(shutdown_signal()).await?;
            info!(
                changes = stats.changes(),
                evaluated = stats.evaluated(),
                "agent stopped"
            );
        }
        Command::Scan => {
            let runtime = AgentRuntime::bootstrap(config).await?;
            let (report, stats) = runtime.scan_once().await?;
            info!(
                files = report.existing,
                vanished = report.vanished,
                added = stats.added,
                modified = stats.modified,
                removed = stats.removed,
                failed = stats.failed,
                "scan complete"
            );
        }
        Command::Events { limit, json } => {
            let events = recent_events(&config, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for event in events {
                    println!(
                        "{:>6}  {}  {:<8}  {}",
                        event.id,
                        event.occurred_at.format("%Y-%m-%d %H:%M:%S"),
                        event.kind,
                        event.path.display()
                    );
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
