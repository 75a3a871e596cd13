pub mod backend;
pub mod config;
pub mod domain;

pub use backend::{AnswerBackend, BackendError};
pub use domain::answer::{Answer, SavedReplyReceipt};
pub use domain::command::{
    classify_command, parse_saved_reply, BotCommand, SavedReplyCommand, SAVED_REPLY_PREFIX,
    SAVED_REPLY_USAGE,
};
pub use domain::event::{parse_events, InboundEvent, RoutedMessage};
