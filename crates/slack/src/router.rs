use std::{sync::Arc, time::Duration};

use capebot_core::config::AppConfig;
use capebot_core::{
    classify_command, parse_events, AnswerBackend, BackendError, BotCommand, RoutedMessage,
};
use secrecy::SecretString;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::handlers::{self, DispatchOutcome};
use crate::transport::{RtmTransport, TransportError};

/// Faults the router does not recover from.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub mention_marker: String,
    pub user_token: SecretString,
    pub poll_delay: Duration,
}

impl From<&AppConfig> for RouterSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            mention_marker: config.mention_marker(),
            user_token: config.cape.user_token.clone(),
            poll_delay: config.router.poll_delay(),
        }
    }
}

pub struct MessageRouter {
    transport: Arc<dyn RtmTransport>,
    backend: Arc<dyn AnswerBackend>,
    settings: RouterSettings,
}

impl MessageRouter {
    pub fn new(
        transport: Arc<dyn RtmTransport>,
        backend: Arc<dyn AnswerBackend>,
        settings: RouterSettings,
    ) -> Self {
        Self { transport, backend, settings }
    }

    /// Reads one batch of events and returns the first one addressed to the bot.
    pub async fn poll_once(&self) -> Result<Option<RoutedMessage>, TransportError> {
        let events = self.transport.read_events().await?;
        Ok(parse_events(&events, &self.settings.mention_marker))
    }

    pub async fn dispatch(&self, message: &RoutedMessage) -> Result<DispatchOutcome, RouterError> {
        match classify_command(&message.text) {
            BotCommand::AddSavedReply => {
                handlers::add_saved_reply(
                    &message.text,
                    &message.channel,
                    self.transport.as_ref(),
                    self.backend.as_ref(),
                )
                .await
            }
            BotCommand::Question => {
                handlers::answer_question(
                    &message.text,
                    &message.channel,
                    self.transport.as_ref(),
                    self.backend.as_ref(),
                    &self.settings.user_token,
                )
                .await
            }
        }
    }

    /// Polls, dispatches, and sleeps until `shutdown` is cancelled or a
    /// transport or backend fault escapes a handler.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), RouterError> {
        info!(
            event_name = "router.started",
            poll_delay_ms = self.settings.poll_delay.as_millis() as u64,
            "message router started"
        );

        loop {
            let routed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                routed = self.poll_once() => routed?,
            };

            match routed {
                Some(message) if !message.text.is_empty() => {
                    self.dispatch_logged(&message).await?;
                }
                Some(message) => {
                    debug!(channel = %message.channel, "ignoring bare mention");
                }
                None => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_delay) => {}
            }
        }

        info!(event_name = "router.stopped", "message router stopped");
        Ok(())
    }

    async fn dispatch_logged(&self, message: &RoutedMessage) -> Result<(), RouterError> {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "ingress.slack.message_routed",
            correlation_id = %correlation_id,
            channel = %message.channel,
            "routing addressed message"
        );

        let outcome = self.dispatch(message).await?;
        info!(
            event_name = "router.dispatch_completed",
            correlation_id = %correlation_id,
            channel = %message.channel,
            outcome = outcome.label(),
            "replied to addressed message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use capebot_core::{Answer, BackendError, InboundEvent, RoutedMessage};
    use tokio_util::sync::CancellationToken;

    use super::{MessageRouter, RouterError, RouterSettings};
    use crate::fakes::{FakeBackend, ScriptedTransport};
    use crate::handlers::{DispatchOutcome, NO_ANSWER_REPLY, SAVED_REPLY_CONFIRMATION};
    use crate::transport::TransportError;

    fn settings(poll_delay: Duration) -> RouterSettings {
        RouterSettings {
            mention_marker: "<@U0BOT>".to_owned(),
            user_token: "user-token".to_owned().into(),
            poll_delay,
        }
    }

    fn router(
        transport: Arc<ScriptedTransport>,
        backend: Arc<FakeBackend>,
        poll_delay: Duration,
    ) -> MessageRouter {
        MessageRouter::new(transport, backend, settings(poll_delay))
    }

    fn routed(text: &str) -> RoutedMessage {
        RoutedMessage { text: text.to_owned(), channel: "C1".to_owned() }
    }

    #[tokio::test]
    async fn poll_once_returns_first_addressed_message() {
        let transport = Arc::new(ScriptedTransport::with_batches(vec![Ok(vec![
            InboundEvent { text: None, channel: Some("C0".to_owned()) },
            InboundEvent::message("C1", "<@U0BOT> first"),
            InboundEvent::message("C2", "<@U0BOT> second"),
        ])]));
        let router = router(transport, Arc::new(FakeBackend::default()), Duration::ZERO);

        let message = router.poll_once().await.expect("poll");

        assert_eq!(
            message,
            Some(RoutedMessage { text: "first".to_owned(), channel: "C1".to_owned() })
        );
    }

    #[tokio::test]
    async fn upper_and_lower_case_prefix_route_to_saved_reply_handler() {
        for text in [".add-saved-reply no pipe here", ".ADD-SAVED-REPLY no pipe here"] {
            let transport = Arc::new(ScriptedTransport::default());
            let backend = Arc::new(FakeBackend::default());
            let router = router(transport.clone(), backend.clone(), Duration::ZERO);

            let outcome = router.dispatch(&routed(text)).await.expect("dispatch");

            assert_eq!(outcome, DispatchOutcome::UsageSent, "`{text}` should reach saved replies");
            assert!(
                backend.questions().await.is_empty(),
                "`{text}` must not be asked as a question"
            );
        }
    }

    #[tokio::test]
    async fn other_text_routes_to_question_handler() {
        let transport = Arc::new(ScriptedTransport::default());
        let backend = Arc::new(FakeBackend::answering(vec![Answer::text("42")]));
        let router = router(transport.clone(), backend.clone(), Duration::ZERO);

        let outcome = router.dispatch(&routed("what is the answer?")).await.expect("dispatch");

        assert_eq!(outcome, DispatchOutcome::Answered);
        assert_eq!(
            backend.questions().await,
            vec![("what is the answer?".to_owned(), "user-token".to_owned())]
        );
        assert_eq!(transport.posts().await, vec![("C1".to_owned(), "42".to_owned())]);
    }

    #[tokio::test]
    async fn run_dispatches_each_cycle_and_waits_between_reads() {
        let poll_delay = Duration::from_millis(40);
        let transport = Arc::new(ScriptedTransport::with_batches(vec![
            Ok(vec![InboundEvent::message("C1", "<@U0BOT> capital of France?")]),
            Ok(vec![]),
            Ok(vec![InboundEvent::message("C1", "no mention here")]),
            Ok(vec![InboundEvent::message("C2", "<@U0BOT> anything else?")]),
        ]));
        let backend = Arc::new(FakeBackend::answering_in_turn(vec![
            vec![Answer::text("Paris"), Answer::text("France")],
            vec![],
        ]));
        let shutdown = CancellationToken::new();
        transport.cancel_when_exhausted(shutdown.clone()).await;

        let router = router(transport.clone(), backend, poll_delay);
        router.run(shutdown).await.expect("router stops cleanly");

        assert_eq!(
            transport.posts().await,
            vec![
                ("C1".to_owned(), "Paris".to_owned()),
                ("C2".to_owned(), NO_ANSWER_REPLY.to_owned()),
            ]
        );

        let reads = transport.read_instants().await;
        assert_eq!(reads.len(), 5, "four scripted batches plus the read that exhausts the script");
        for pair in reads.windows(2) {
            assert!(
                pair[1].duration_since(pair[0]) >= poll_delay,
                "successive reads must be separated by the poll delay"
            );
        }
    }

    #[tokio::test]
    async fn run_returns_immediately_when_already_cancelled() {
        let transport = Arc::new(ScriptedTransport::default());
        let router =
            router(transport.clone(), Arc::new(FakeBackend::default()), Duration::from_secs(60));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        router.run(shutdown).await.expect("clean stop");

        assert!(transport.read_instants().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_poll_delay() {
        let transport = Arc::new(ScriptedTransport::with_batches(vec![Ok(vec![])]));
        let router =
            router(transport.clone(), Arc::new(FakeBackend::default()), Duration::from_secs(3600));
        let shutdown = CancellationToken::new();

        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), router.run(shutdown))
            .await
            .expect("run should not sleep through shutdown")
            .expect("clean stop");
        assert_eq!(transport.read_instants().await.len(), 1);
    }

    #[tokio::test]
    async fn bare_mention_is_not_dispatched() {
        let transport = Arc::new(ScriptedTransport::with_batches(vec![Ok(vec![
            InboundEvent::message("C1", "<@U0BOT>   "),
        ])]));
        let backend = Arc::new(FakeBackend::default());
        let shutdown = CancellationToken::new();
        transport.cancel_when_exhausted(shutdown.clone()).await;

        router(transport.clone(), backend.clone(), Duration::from_millis(1))
            .run(shutdown)
            .await
            .expect("clean stop");

        assert!(transport.posts().await.is_empty());
        assert!(backend.questions().await.is_empty());
    }

    #[tokio::test]
    async fn transport_read_failure_ends_the_loop() {
        let transport = Arc::new(ScriptedTransport::with_batches(vec![Err(
            TransportError::Receive("socket closed".to_owned()),
        )]));
        let router = router(transport, Arc::new(FakeBackend::default()), Duration::from_millis(1));

        let error = router.run(CancellationToken::new()).await.expect_err("fatal read");

        assert!(matches!(error, RouterError::Transport(TransportError::Receive(_))));
    }

    #[tokio::test]
    async fn backend_outage_while_answering_ends_the_loop() {
        let transport = Arc::new(ScriptedTransport::with_batches(vec![Ok(vec![
            InboundEvent::message("C1", "<@U0BOT> hello?"),
        ])]));
        let backend = Arc::new(FakeBackend::failing_answers(BackendError::Transport(
            "connection refused".to_owned(),
        )));
        let router = router(transport.clone(), backend, Duration::from_millis(1));

        let error = router.run(CancellationToken::new()).await.expect_err("fatal backend");

        assert!(matches!(error, RouterError::Backend(BackendError::Transport(_))));
        assert!(transport.posts().await.is_empty(), "no reply is sent for a fatal fault");
    }

    #[tokio::test]
    async fn saved_reply_round_trip_through_the_loop() {
        let transport = Arc::new(ScriptedTransport::with_batches(vec![Ok(vec![
            InboundEvent::message("C7", "<@U0BOT> .add-saved-reply What is Cape?|It's a QA tool"),
        ])]));
        let backend = Arc::new(FakeBackend::default());
        let shutdown = CancellationToken::new();
        transport.cancel_when_exhausted(shutdown.clone()).await;

        router(transport.clone(), backend.clone(), Duration::from_millis(1))
            .run(shutdown)
            .await
            .expect("clean stop");

        assert_eq!(
            backend.saved_replies().await,
            vec![("What is Cape?".to_owned(), "It's a QA tool".to_owned())]
        );
        assert_eq!(
            transport.posts().await,
            vec![("C7".to_owned(), SAVED_REPLY_CONFIRMATION.to_owned())]
        );
    }
}
