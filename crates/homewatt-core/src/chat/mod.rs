//! Conversation transcript with the query assistant.
//!
//! The transcript is a flat, append-only list of messages persisted as JSON
//! under a single storage key.

pub mod history;

pub use history::{ChatHistory, Message, Role, DEFAULT_HISTORY_KEY};
