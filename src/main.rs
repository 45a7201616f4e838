mod bootstrap;
mod config;
mod diagnostics;
mod discovery;
mod eligibility;
mod error;
mod fetcher;
mod ledger;
mod scheduler;
mod server;
mod settlement;
mod sweep;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WatcherConfig;
use crate::ledger::models::ObjectId;

/// Forced settlement of lapsed commitments
#[derive(Parser)]
#[command(name = "watcher")]
#[command(about = "Settles commitments whose grace period has lapsed", long_about = None)]
#[command(version)]
struct Cli {
    /// Evaluate and log eligible commitments without submitting
    #[arg(long, global = true, env = "DRY_RUN")]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep on the configured interval until SIGINT/SIGTERM (default)
    Run,
    /// Run a single sweep and exit
    Once,
    /// Print each commitment with its grace boundary and eligibility
    Diagnose {
        /// Inspect a single commitment
        #[arg(long)]
        id: Option<String>,
    },
}

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,watcher=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Flips the watch channel on SIGINT or SIGTERM
fn spawn_signal_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("⚠️  Cannot listen for SIGTERM: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        info!("🛑 Shutdown signal received");
        let _ = tx.send(true);
    });

    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    info!("🚀 Starting commitment settlement watcher");

    let config = WatcherConfig::from_env().context("failed to load configuration")?;
    let components = bootstrap::initialize(config).context("failed to initialize watcher")?;
    let shutdown = spawn_signal_listener();

    match cli.command.unwrap_or(Command::Run) {
        Command::Diagnose { id } => {
            let report = diagnostics::diagnose(
                &components.config,
                &components.discovery(),
                &components.fetcher(),
                id.map(ObjectId::new),
                Utc::now(),
            )
            .await
            .context("diagnostics failed")?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Once => {
            components.preflight_balance().await;
            let driver = components.driver(cli.dry_run);
            if let Some(summary) = driver.run_once(shutdown).await {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Command::Run => {
            components.preflight_balance().await;
            let driver = Arc::new(components.driver(cli.dry_run));

            if let Some(bind_address) = components.config.status_bind_address.clone() {
                let app = server::create_app(components.status.clone());
                let server_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = server::run_server(app, &bind_address, server_shutdown).await {
                        error!("❌ Status server stopped: {}", e);
                    }
                });
            }

            driver.run(shutdown).await;
        }
    }

    Ok(())
}
