//! Slack Integration - RTM bot interface
//!
//! This crate provides the Slack side of capebot:
//! - **Transport** (`transport`) - the `RtmTransport` seam: connect, read events, post
//! - **RTM client** (`rtm`) - `rtm.connect` WebSocket feed plus `chat.postMessage`
//! - **Router** (`router`) - poll loop that picks out messages addressed to the bot
//! - **Handlers** (`handlers`) - question answering and `.add-saved-reply`
//!
//! # Architecture
//!
//! ```text
//! RTM events → MessageRouter → { answer_question, add_saved_reply } → AnswerBackend
//!                    ↓
//!            chat.postMessage ← reply
//! ```

pub mod handlers;
pub mod router;
pub mod rtm;
pub mod transport;

#[cfg(test)]
mod fakes;

pub use handlers::DispatchOutcome;
pub use router::{MessageRouter, RouterError, RouterSettings};
pub use rtm::SlackRtmClient;
pub use transport::{RtmTransport, TransportError};
