mod bootstrap;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;

use leadpath_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use leadpath_engine::{
    InMemoryConsentDirectory, InMemoryRoster, InMemoryTenantDirectory, Sweeper, TracingPublisher,
};

/// Lead routing scheduler: runs migrations and drives the SLA sweeper.
#[derive(Debug, Parser)]
#[command(name = "leadpath-server", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the database URL from config/environment.
    #[arg(long)]
    database_url: Option<String>,

    /// Run a single sweep pass and exit instead of looping.
    #[arg(long)]
    sweep_once: bool,
}

fn init_logging(config: &AppConfig) {
    use leadpath_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        require_file: false,
        overrides: ConfigOverrides {
            database_url: cli.database_url,
            ..ConfigOverrides::default()
        },
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    // The scheduler only drives timers, which live entirely in the
    // database; tenant/consent/roster adapters are wired per deployment
    // and are not consulted on the sweep path. Breach events go to the
    // log stream until an outbox consumer is attached.
    let engine = bootstrap::build_engine(
        &app,
        Arc::new(InMemoryTenantDirectory::new()),
        Arc::new(InMemoryConsentDirectory::new()),
        Arc::new(InMemoryRoster::new()),
        Arc::new(TracingPublisher::new()),
    );

    if cli.sweep_once {
        let report = engine.process_sla_timers(None).await?;
        tracing::info!(
            event_name = "system.sweep_once.complete",
            processed = report.processed,
            "single sweep pass complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(
        engine,
        Duration::from_secs(app.config.sweeper.interval_secs),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    tracing::info!(event_name = "system.server.started", "leadpath scheduler started");
    tokio::signal::ctrl_c().await?;
    tracing::info!(event_name = "system.server.stopping", "leadpath scheduler stopping");

    let _ = shutdown_tx.send(true);
    sweeper_handle.await?;

    Ok(())
}
