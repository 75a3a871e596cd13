use capebot_core::{
    parse_saved_reply, AnswerBackend, BackendError, SavedReplyCommand, SAVED_REPLY_USAGE,
};
use secrecy::SecretString;

use crate::router::RouterError;
use crate::transport::RtmTransport;

pub const NO_ANSWER_REPLY: &str = "Sorry! I don't know the answer to that.";
pub const SAVED_REPLY_CONFIRMATION: &str = "Thanks, I'll remember that!";

/// Terminal state reached by one dispatched message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Answered,
    NoAnswer,
    UsageSent,
    SavedReplyStored,
    SavedReplyRejected,
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::NoAnswer => "no_answer",
            Self::UsageSent => "usage_sent",
            Self::SavedReplyStored => "saved_reply_stored",
            Self::SavedReplyRejected => "saved_reply_rejected",
        }
    }
}

/// Replies with the backend's highest-confidence answer, or the fallback.
pub async fn answer_question(
    question: &str,
    channel: &str,
    transport: &dyn RtmTransport,
    backend: &dyn AnswerBackend,
    user_token: &SecretString,
) -> Result<DispatchOutcome, RouterError> {
    let answers = backend.answer(question, user_token).await?;

    match answers.first() {
        Some(best) => {
            transport.post_message(channel, &best.answer_text).await?;
            Ok(DispatchOutcome::Answered)
        }
        None => {
            transport.post_message(channel, NO_ANSWER_REPLY).await?;
            Ok(DispatchOutcome::NoAnswer)
        }
    }
}

/// Handles `.add-saved-reply <question> | <answer>`. Backend rejections are
/// relayed to the channel; any other backend failure is returned.
pub async fn add_saved_reply(
    text: &str,
    channel: &str,
    transport: &dyn RtmTransport,
    backend: &dyn AnswerBackend,
) -> Result<DispatchOutcome, RouterError> {
    let SavedReplyCommand::Parsed { question, answer } = parse_saved_reply(text) else {
        transport.post_message(channel, SAVED_REPLY_USAGE).await?;
        return Ok(DispatchOutcome::UsageSent);
    };

    match backend.add_saved_reply(&question, &answer).await {
        Ok(_) => {
            transport.post_message(channel, SAVED_REPLY_CONFIRMATION).await?;
            Ok(DispatchOutcome::SavedReplyStored)
        }
        Err(BackendError::Rejected(message)) => {
            transport.post_message(channel, &message).await?;
            Ok(DispatchOutcome::SavedReplyRejected)
        }
        Err(error) => Err(error.into()),
    }
}
