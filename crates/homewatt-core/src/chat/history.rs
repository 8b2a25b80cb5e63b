use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Storage key used by the conversation view
pub const DEFAULT_HISTORY_KEY: &str = "chatHistory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("You"),
            Role::Assistant => f.write_str("Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
}

pub struct ChatHistory {
    store: Arc<dyn KeyValueStore>,
    key: String,
    messages: Vec<Message>,
}

impl ChatHistory {
    /// Load the transcript stored under `key`. Unreadable history starts empty.
    pub fn open(store: Arc<dyn KeyValueStore>, key: &str) -> Self {
        let messages = match store.get(key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, key, "Stored chat history is corrupt, starting fresh");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, key, "Failed to read chat history");
                Vec::new()
            }
        };
        debug!(key, count = messages.len(), "Loaded chat history");

        Self {
            store,
            key: key.to_string(),
            messages,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message and persist the whole transcript. A failed write is
    /// logged; the message is still kept for this run.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> &Message {
        self.messages.push(Message {
            id: new_message_id(),
            role,
            content: content.into(),
        });
        self.persist();
        &self.messages[self.messages.len() - 1]
    }

    fn persist(&self) {
        let encoded = match serde_json::to_string(&self.messages) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode chat history");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &encoded) {
            warn!(error = %e, key = %self.key, "Failed to write chat history");
        }
    }
}

fn new_message_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}
