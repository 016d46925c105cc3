mod bootstrap;
mod commands;
mod health;
mod schedule;
mod trigger;

use std::time::Duration;

use anyhow::Result;
use rollcall_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use rollcall_core::config::LogFormat::*;
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
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = health::router(app.registry.clone())
        .merge(trigger::router(trigger::TriggerState { service: app.service.clone() }));
    let http =
        health::spawn(&app.config.server.bind_address, app.config.server.port, router).await?;

    let schedule_entries = schedule::resolve_entries(&app.config.schedule)?;
    let _schedule_task = schedule::spawn(schedule_entries, app.service.clone());

    tracing::info!(
        event_name = "system.server.slack_transport_mode",
        transport_mode = if app.slack_runner.is_noop_transport() { "noop" } else { "socket" },
        correlation_id = "bootstrap",
        "slack runner transport mode initialized"
    );
    app.slack_runner.start().await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "rollcall-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "rollcall-server stopping"
    );

    app.scheduler.shutdown();
    http.shutdown(Duration::from_secs(app.config.server.graceful_shutdown_secs)).await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
