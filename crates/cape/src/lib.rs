//! Cape backend client
//!
//! Implements [`capebot_core::AnswerBackend`] against the Cape responder HTTP
//! API. Every call is a form-encoded `POST {base_url}/{method}` answered with
//! a `{ "success": bool, "result": ... }` envelope.

pub mod client;

pub use client::{CapeClient, CapeClientSettings};
