use std::sync::Arc;

use capebot_cape::{CapeClient, CapeClientSettings};
use capebot_core::config::{AppConfig, ConfigError};
use capebot_core::BackendError;
use capebot_slack::{
    MessageRouter, RouterError, RouterSettings, RtmTransport, SlackRtmClient, TransportError,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub transport: Arc<SlackRtmClient>,
    pub router: MessageRouter,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cape client could not be built: {0}")]
    Backend(#[source] BackendError),
    #[error("slack client could not be built: {0}")]
    SlackClient(#[source] TransportError),
    #[error("slack rtm connection failed: {0}")]
    SlackConnect(#[source] TransportError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        bot_id = %config.slack.bot_id,
        "starting application bootstrap"
    );

    let backend = CapeClient::new(CapeClientSettings::from(&config.cape))
        .map_err(BootstrapError::Backend)?;
    let transport =
        Arc::new(SlackRtmClient::new(&config.slack).map_err(BootstrapError::SlackClient)?);
    let router = MessageRouter::new(
        transport.clone(),
        Arc::new(backend),
        RouterSettings::from(&config),
    );

    info!(
        event_name = "system.bootstrap.clients_ready",
        correlation_id = "bootstrap",
        cape_base_url = %config.cape.base_url,
        slack_api_base_url = %config.slack.api_base_url,
        "slack and cape clients constructed"
    );

    Ok(Application { config, transport, router })
}

impl Application {
    /// Opens the RTM session. Must succeed before `run`.
    pub async fn connect(&self) -> Result<(), BootstrapError> {
        self.transport.connect().await.map_err(BootstrapError::SlackConnect)?;
        info!(
            event_name = "system.bootstrap.slack_connected",
            correlation_id = "bootstrap",
            "slack rtm session established"
        );
        Ok(())
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), RouterError> {
        self.router.run(shutdown).await
    }
}
