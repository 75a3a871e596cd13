//! Scripted collaborators shared by the router and handler tests.

use std::collections::VecDeque;
use std::time::Instant;

use async_trait::async_trait;
use capebot_core::{Answer, AnswerBackend, BackendError, InboundEvent, SavedReplyReceipt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::transport::{RtmTransport, TransportError};

#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<TransportState>,
}

#[derive(Default)]
struct TransportState {
    batches: VecDeque<Result<Vec<InboundEvent>, TransportError>>,
    read_instants: Vec<Instant>,
    posts: Vec<(String, String)>,
    post_failure: Option<TransportError>,
    on_exhausted: Option<CancellationToken>,
}

impl ScriptedTransport {
    pub fn with_batches(batches: Vec<Result<Vec<InboundEvent>, TransportError>>) -> Self {
        Self {
            state: Mutex::new(TransportState { batches: batches.into(), ..TransportState::default() }),
        }
    }

    pub fn failing_posts(error: TransportError) -> Self {
        Self {
            state: Mutex::new(TransportState {
                post_failure: Some(error),
                ..TransportState::default()
            }),
        }
    }

    /// Cancels `token` on the first read after the script runs out.
    pub async fn cancel_when_exhausted(&self, token: CancellationToken) {
        self.state.lock().await.on_exhausted = Some(token);
    }

    pub async fn posts(&self) -> Vec<(String, String)> {
        self.state.lock().await.posts.clone()
    }

    pub async fn read_instants(&self) -> Vec<Instant> {
        self.state.lock().await.read_instants.clone()
    }
}

#[async_trait]
impl RtmTransport for ScriptedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read_events(&self) -> Result<Vec<InboundEvent>, TransportError> {
        let mut state = self.state.lock().await;
        state.read_instants.push(Instant::now());
        match state.batches.pop_front() {
            Some(batch) => batch,
            None => {
                if let Some(token) = &state.on_exhausted {
                    token.cancel();
                }
                Ok(Vec::new())
            }
        }
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.post_failure.clone() {
            return Err(error);
        }
        state.posts.push((channel.to_owned(), text.to_owned()));
        Ok(())
    }
}

pub struct FakeBackend {
    state: Mutex<BackendState>,
}

struct BackendState {
    answers: VecDeque<Result<Vec<Answer>, BackendError>>,
    saved_reply_result: Result<SavedReplyReceipt, BackendError>,
    questions: Vec<(String, String)>,
    saved_replies: Vec<(String, String)>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::answering_in_turn(Vec::new())
    }
}

impl FakeBackend {
    pub fn answering(answers: Vec<Answer>) -> Self {
        Self::answering_in_turn(vec![answers])
    }

    pub fn answering_in_turn(turns: Vec<Vec<Answer>>) -> Self {
        Self::from_results(turns.into_iter().map(Ok).collect())
    }

    pub fn failing_answers(error: BackendError) -> Self {
        Self::from_results(vec![Err(error)])
    }

    pub fn rejecting_saved_replies(error: BackendError) -> Self {
        let mut backend = Self::default();
        backend.state.get_mut().saved_reply_result = Err(error);
        backend
    }

    fn from_results(answers: Vec<Result<Vec<Answer>, BackendError>>) -> Self {
        Self {
            state: Mutex::new(BackendState {
                answers: answers.into(),
                saved_reply_result: Ok(SavedReplyReceipt {
                    reply_id: "reply-1".to_owned(),
                    answer_id: "answer-1".to_owned(),
                }),
                questions: Vec::new(),
                saved_replies: Vec::new(),
            }),
        }
    }

    /// `(question, token)` pairs in call order.
    pub async fn questions(&self) -> Vec<(String, String)> {
        self.state.lock().await.questions.clone()
    }

    pub async fn saved_replies(&self) -> Vec<(String, String)> {
        self.state.lock().await.saved_replies.clone()
    }
}

#[async_trait]
impl AnswerBackend for FakeBackend {
    async fn answer(
        &self,
        question: &str,
        token: &SecretString,
    ) -> Result<Vec<Answer>, BackendError> {
        let mut state = self.state.lock().await;
        state.questions.push((question.to_owned(), token.expose_secret().to_owned()));
        state.answers.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn add_saved_reply(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<SavedReplyReceipt, BackendError> {
        let mut state = self.state.lock().await;
        state.saved_replies.push((question.to_owned(), answer.to_owned()));
        state.saved_reply_result.clone()
    }
}
