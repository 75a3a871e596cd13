use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::domain::answer::{Answer, SavedReplyReceipt};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend understood the call and refused it; the message is meant
    /// for the person who issued the command.
    #[error("{0}")]
    Rejected(String),
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("unexpected backend response: {0}")]
    UnexpectedResponse(String),
}

/// Question answering and saved-reply storage.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// Ranked answers, highest confidence first. Empty when nothing clears
    /// the configured threshold.
    async fn answer(
        &self,
        question: &str,
        token: &SecretString,
    ) -> Result<Vec<Answer>, BackendError>;

    async fn add_saved_reply(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<SavedReplyReceipt, BackendError>;
}
