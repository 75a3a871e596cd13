use async_trait::async_trait;
use capebot_core::InboundEvent;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport post failed: {0}")]
    Post(String),
}

/// The real-time messaging feed the bot listens on and replies through.
#[async_trait]
pub trait RtmTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// Returns whatever events arrived since the previous read, possibly
    /// none. May wait a bounded time for data.
    async fn read_events(&self) -> Result<Vec<InboundEvent>, TransportError>;

    /// Posts `text` to `channel` as the bot user. A reply the service refuses
    /// is not an error; a failed exchange is.
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), TransportError>;
}
