use crate::stream::AgentStream;
use async_trait::async_trait;
use neuron_core::{AgentType, MessageType, NeuronResult};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything an agent gets to see for one invocation.
#[derive(Debug, Clone)]
pub struct AgentInput {
    /// The task this invocation belongs to.
    pub task_id: Uuid,
    /// Session that submitted the task.
    pub session_id: String,
    /// Authenticated author of the message.
    pub user_id: String,
    /// The user's message.
    pub description: String,
    /// Kind of content the user sent.
    pub message_type: MessageType,
    /// Client-supplied hints, such as `agents`.
    pub metadata: HashMap<String, String>,
    /// Snapshot of the task's shared context taken when the agent was
    /// dispatched. Agents never see later writes.
    pub shared_context: HashMap<String, String>,
    /// Fires when the task is cancelled. Agents should stop producing.
    pub cancel: CancellationToken,
}

impl AgentInput {
    /// Builds an input with empty metadata and context.
    pub fn new(task_id: Uuid, session_id: &str, user_id: &str, description: &str) -> Self {
        Self {
            task_id,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            description: description.to_string(),
            message_type: MessageType::Text,
            metadata: HashMap::new(),
            shared_context: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Adds one shared-context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.shared_context.insert(key.into(), value.into());
        self
    }

    /// Replaces the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A specialized content-producing unit.
///
/// `run` returns immediately with the receiving end of the agent's event
/// stream; the work itself happens on a spawned task that feeds the channel.
/// The stream is lazy, finite and cannot be restarted.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The role this agent fills.
    fn agent_type(&self) -> AgentType;

    /// Agents whose outputs must be in the shared context before this one
    /// starts. Only agents that are part of the same task count.
    fn depends_on(&self) -> Vec<AgentType> {
        Vec::new()
    }

    /// Starts the agent and returns its event stream.
    async fn run(&self, input: AgentInput) -> NeuronResult<AgentStream>;
}
