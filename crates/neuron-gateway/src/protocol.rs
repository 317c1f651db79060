//! Wire formats.
//!
//! WebSocket frames are JSON objects with a `type` discriminator and a
//! `payload`. The bridge-level [`StreamRequest`]/[`StreamResponse`] envelopes
//! are what a bidirectional RPC transport would carry.

use neuron_core::{
    AgentType, ChatRequest, ErrorInfo, Message, NeuronResult, TaskStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A user message. Identity fields in the payload are ignored.
    Chat(ChatRequest),
    /// Liveness probe, answered with a heartbeat.
    Ping,
    /// Client keepalive. Resets the idle timer, never answered.
    Heartbeat,
    /// A problem the client reports. Logged, never answered.
    Error {
        /// Client-defined error code.
        code: String,
        /// Description.
        message: String,
    },
    /// Abandon a task started from this session.
    Cancel {
        /// Task to cancel.
        task_id: Uuid,
    },
}

impl ClientFrame {
    /// The `type` values a client may send.
    pub const TYPES: [&'static str; 5] = ["chat", "ping", "heartbeat", "error", "cancel"];

    /// Parses one text frame.
    ///
    /// Well-formed JSON whose `type` is not in [`ClientFrame::TYPES`] fails
    /// with `unsupported_frame`; anything else that does not parse fails
    /// with `invalid_json`.
    pub fn parse(raw: &str) -> Result<Self, ErrorInfo> {
        serde_json::from_str(raw).map_err(|e| {
            let kind = serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string));
            match kind {
                Some(kind) if !Self::TYPES.contains(&kind.as_str()) => ErrorInfo::new(
                    "unsupported_frame",
                    format!("unsupported frame type '{kind}'"),
                ),
                _ => ErrorInfo::new("invalid_json", e.to_string()),
            }
        })
    }
}

/// A frame sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every connection.
    Connected {
        /// Session the connection joined.
        session_id: String,
        /// Identity the gateway resolved.
        user_id: String,
        /// Id of this connection.
        connection_id: Uuid,
    },
    /// One response fragment.
    Chat(StreamResponse),
    /// Keeps idle timers alive. Carries no content.
    Heartbeat(StreamResponse),
    /// A problem with something this connection sent.
    Error {
        /// Stable snake_case code.
        code: String,
        /// Description.
        message: String,
    },
}

impl ServerFrame {
    /// An error frame.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wraps a bridge response in the matching frame type.
    pub fn from_response(response: StreamResponse) -> Self {
        if response.is_heartbeat {
            ServerFrame::Heartbeat(response)
        } else {
            ServerFrame::Chat(response)
        }
    }

    /// Serializes the frame for a text message.
    pub fn to_text(&self) -> NeuronResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Client-to-server envelope of the streaming bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Session the request belongs to.
    pub session_id: String,
    /// Authenticated sender.
    pub user_id: String,
    /// What the client asks for.
    pub payload: RequestPayload,
}

/// What a [`StreamRequest`] asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPayload {
    /// Start a task for a user message.
    Chat(ChatRequest),
    /// Cancel a running task.
    Cancel {
        /// Task to cancel.
        task_id: Uuid,
    },
}

impl StreamRequest {
    /// Wraps a chat request, taking the identity from it.
    pub fn chat(request: ChatRequest) -> Self {
        Self {
            session_id: request.session_id.clone(),
            user_id: request.user_id.clone(),
            payload: RequestPayload::Chat(request),
        }
    }

    /// A request to cancel `task_id`.
    pub fn cancel(session_id: &str, user_id: &str, task_id: Uuid) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            payload: RequestPayload::Cancel { task_id },
        }
    }
}

/// Server-to-client envelope of the streaming bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResponse {
    /// Session the response is addressed to.
    pub session_id: String,
    /// The fragment. Empty for heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponsePayload>,
    /// Set on the last fragment of a task.
    #[serde(default)]
    pub is_final: bool,
    /// Keepalive with no content.
    #[serde(default)]
    pub is_heartbeat: bool,
}

/// What a [`StreamResponse`] carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    /// One response fragment.
    Chat(Message),
}

impl StreamResponse {
    /// Wraps one fragment, copying its `is_final` flag.
    pub fn fragment(message: Message) -> Self {
        Self {
            session_id: message.session_id.clone(),
            is_final: message.is_final,
            payload: Some(ResponsePayload::Chat(message)),
            is_heartbeat: false,
        }
    }

    /// A heartbeat for `session_id`.
    pub fn heartbeat(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            payload: None,
            is_final: false,
            is_heartbeat: true,
        }
    }

    /// A terminal failure for a request that never became a task.
    pub fn rejected(session_id: &str, user_id: &str, error: ErrorInfo) -> Self {
        let mut message = Message::new(session_id, user_id, "").with_agent(AgentType::Orchestrator);
        message.status = TaskStatus::Failed;
        message.is_final = true;
        message.error = Some(error);
        Self::fragment(message)
    }

    /// The carried fragment, if any.
    pub fn message(&self) -> Option<&Message> {
        match &self.payload {
            Some(ResponsePayload::Chat(message)) => Some(message),
            None => None,
        }
    }
}
