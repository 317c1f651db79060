use neuron_core::{MessageType, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Events emitted while an agent runs.
///
/// A well-formed stream is any number of `Delta`/`ToolCall` events followed
/// by exactly one `Done` or `Error`. Anything sent after the terminal event
/// is ignored, and a stream that closes without one counts as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A chunk of user-facing content.
    Delta {
        /// Text to relay.
        content: String,
        /// How the client should render `content`.
        #[serde(default)]
        message_type: MessageType,
    },

    /// The agent wants a tool invoked; relayed to the client as-is.
    ToolCall {
        /// The requested invocation.
        call: ToolCall,
    },

    /// The agent finished. `outputs` are merged into the task's shared
    /// context before any downstream agent starts.
    Done {
        /// Entries for the shared context.
        #[serde(default)]
        outputs: HashMap<String, String>,
    },

    /// The agent failed.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl AgentEvent {
    /// A text delta.
    pub fn text(content: impl Into<String>) -> Self {
        AgentEvent::Delta {
            content: content.into(),
            message_type: MessageType::Text,
        }
    }

    /// A successful completion with no outputs.
    pub fn done() -> Self {
        AgentEvent::Done {
            outputs: HashMap::new(),
        }
    }

    /// A successful completion exposing one output.
    pub fn done_with(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut outputs = HashMap::new();
        outputs.insert(key.into(), value.into());
        AgentEvent::Done { outputs }
    }

    /// A failure.
    pub fn error(message: impl Into<String>) -> Self {
        AgentEvent::Error {
            message: message.into(),
        }
    }

    /// Returns true for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done { .. } | AgentEvent::Error { .. })
    }
}

/// Receiving half of an agent's event stream.
///
/// Dropping it tells the producing task to stop: its next send fails.
pub type AgentStream = mpsc::Receiver<AgentEvent>;
