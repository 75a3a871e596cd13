use std::time::Duration;

use async_trait::async_trait;
use capebot_core::config::SlackConfig;
use capebot_core::InboundEvent;
use futures_util::{FutureExt, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::transport::{RtmTransport, TransportError};

type RtmSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Slack RTM client: `rtm.connect` opens the event socket, replies go through
/// the Web API's `chat.postMessage`.
pub struct SlackRtmClient {
    http: Client,
    api_base_url: String,
    bot_token: SecretString,
    bot_id: String,
    read_timeout: Duration,
    timeout: Duration,
    socket: Mutex<Option<RtmSocket>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "self", default)]
    bot: Option<RtmSelf>,
}

#[derive(Debug, Deserialize)]
struct RtmSelf {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    as_user: bool,
}

impl SlackRtmClient {
    pub fn new(config: &SlackConfig) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            bot_id: config.bot_id.clone(),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            timeout,
            socket: Mutex::new(None),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base_url)
    }

    /// Asks `auth.test` who the bot token belongs to and checks it against
    /// the configured bot id. Returns the reported user id.
    pub async fn verify_identity(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .post(self.endpoint("auth.test"))
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(format!("auth.test: {error}")))?;
        let body: AuthTestResponse = response
            .json()
            .await
            .map_err(|error| TransportError::Connect(format!("auth.test response: {error}")))?;

        if !body.ok {
            let error = body.error.unwrap_or_else(|| "unknown_error".to_owned());
            return Err(TransportError::Connect(format!("auth.test failed: {error}")));
        }

        let user_id = body
            .user_id
            .ok_or_else(|| TransportError::Connect("auth.test returned no user_id".to_owned()))?;
        self.ensure_bot_id("auth.test", &user_id)?;
        Ok(user_id)
    }

    /// A wrong `slack.bot_id` means the mention marker never matches.
    fn ensure_bot_id(&self, method: &str, reported: &str) -> Result<(), TransportError> {
        if reported == self.bot_id {
            return Ok(());
        }
        Err(TransportError::Connect(format!(
            "{method} authenticated as bot user `{reported}` but slack.bot_id is `{}`",
            self.bot_id
        )))
    }

    async fn open_socket_url(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .post(self.endpoint("rtm.connect"))
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let body: RtmConnectResponse = response
            .json()
            .await
            .map_err(|error| TransportError::Connect(format!("rtm.connect response: {error}")))?;

        if !body.ok {
            let error = body.error.unwrap_or_else(|| "unknown_error".to_owned());
            return Err(TransportError::Connect(format!("rtm.connect failed: {error}")));
        }

        if let Some(bot) = &body.bot {
            self.ensure_bot_id("rtm.connect", &bot.id)?;
            debug!(bot_user_id = %bot.id, "rtm.connect identified bot user");
        }

        body.url.ok_or_else(|| TransportError::Connect("rtm.connect returned no url".to_owned()))
    }
}

#[async_trait]
impl RtmTransport for SlackRtmClient {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_socket_url().await?;
        let (socket, _) = tokio::time::timeout(self.timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Connect("rtm socket handshake timed out".to_owned()))?
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.socket.lock().await = Some(socket);
        info!(event_name = "transport.slack.connected", "slack rtm socket connected");
        Ok(())
    }

    async fn read_events(&self) -> Result<Vec<InboundEvent>, TransportError> {
        let mut guard = self.socket.lock().await;
        let socket = guard
            .as_mut()
            .ok_or_else(|| TransportError::Receive("rtm socket is not connected".to_owned()))?;

        let mut events = Vec::new();
        let Ok(mut frame) = tokio::time::timeout(self.read_timeout, socket.next()).await else {
            return Ok(events);
        };

        // After the first frame, only take what is already buffered.
        loop {
            match frame {
                None => return Err(TransportError::Receive("rtm socket closed".to_owned())),
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                Some(Ok(message)) => events.extend(decode_frame(message)),
            }

            match socket.next().now_or_never() {
                Some(next) => frame = next,
                None => break,
            }
        }

        Ok(events)
    }

    /// A reply Slack refuses (`ok: false`) is logged and dropped; only a
    /// failed or undecodable exchange is an error.
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.endpoint("chat.postMessage"))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&PostMessageRequest { channel, text, as_user: true })
            .send()
            .await
            .map_err(|error| TransportError::Post(error.to_string()))?;
        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|error| TransportError::Post(format!("chat.postMessage response: {error}")))?;

        if !body.ok {
            let error = body.error.unwrap_or_else(|| "unknown_error".to_owned());
            warn!(
                event_name = "egress.slack.post_rejected",
                channel,
                status = status.as_u16(),
                slack_error = %error,
                "slack rejected reply; message dropped"
            );
            return Ok(());
        }

        debug!(event_name = "egress.slack.message_posted", channel, "posted slack message");
        Ok(())
    }
}

fn decode_frame(message: Message) -> Option<InboundEvent> {
    let Message::Text(text) = message else {
        return None;
    };

    match serde_json::from_str::<InboundEvent>(&text) {
        Ok(event) => Some(event),
        Err(error) => {
            debug!(error = %error, "skipping unparseable rtm frame");
            None
        }
    }
}
