mod bootstrap;

use anyhow::Result;
use capebot_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;

fn init_logging(config: &AppConfig) {
    use capebot_core::config::LogFormat::*;
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
    // Logging needs the loaded config, so config errors surface through anyhow only.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    if let Err(error) = app.connect().await {
        tracing::error!(
            event_name = "system.server.connect_failed",
            correlation_id = "bootstrap",
            error = %error,
            "could not connect to slack"
        );
        return Err(error.into());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        mention_marker = %app.config.mention_marker(),
        "capebot-server started"
    );

    if let Err(error) = app.run(shutdown).await {
        tracing::error!(
            event_name = "system.server.router_failed",
            correlation_id = "runtime",
            error = %error,
            "message router stopped on an unrecoverable fault"
        );
        return Err(error.into());
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "capebot-server stopping"
    );
    Ok(())
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(event_name = "system.server.signal", "ctrl-c received"),
        Err(error) => tracing::warn!(
            event_name = "system.server.signal",
            error = %error,
            "could not listen for ctrl-c; stopping"
        ),
    }
    shutdown.cancel();
}
