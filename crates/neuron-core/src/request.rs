use crate::error::{NeuronError, NeuronResult};
use crate::message::{Message, MessageType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user message entering the pipeline.
///
/// `session_id` and `user_id` are accepted on the wire for compatibility but
/// are always overwritten by [`ChatRequest::stamped`] with the identity the
/// connection was authenticated with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Target session.
    #[serde(default)]
    pub session_id: String,
    /// Authenticated user.
    #[serde(default)]
    pub user_id: String,
    /// The user's message text.
    pub content: String,
    /// Kind of content the user sent.
    #[serde(default)]
    pub message_type: MessageType,
    /// Free-form client metadata (used as classification hints).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChatRequest {
    /// Creates a text request for the given session and user.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            metadata: HashMap::new(),
        }
    }

    /// Replaces the identity fields with authenticated values.
    pub fn stamped(mut self, user_id: &str, session_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self.session_id = session_id.to_string();
        self
    }

    /// Sets the content kind.
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checks identity is present and content is non-blank.
    pub fn validate(&self) -> NeuronResult<()> {
        if self.session_id.is_empty() || self.user_id.is_empty() {
            return Err(NeuronError::Auth(
                "request is missing user_id or session_id".to_string(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(NeuronError::Transport("message content is empty".to_string()));
        }
        Ok(())
    }

    /// The request as a persisted user message.
    pub fn to_message(&self) -> Message {
        Message::new(&self.session_id, &self.user_id, &self.content).with_type(self.message_type)
    }
}
