use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The specialized agent that produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Coordinating role. Never invoked as a separate agent.
    Orchestrator,
    /// Gathers background information for open-ended questions.
    Researcher,
    /// Synthesizes everything gathered into the user-facing answer.
    Writer,
    /// Produces or explains code.
    Code,
    /// Produces image descriptions or generation prompts.
    Image,
    /// Produces video storyboards or generation prompts.
    Video,
}

impl AgentType {
    /// Every agent type, in declaration order.
    pub const ALL: [AgentType; 6] = [
        AgentType::Orchestrator,
        AgentType::Researcher,
        AgentType::Writer,
        AgentType::Code,
        AgentType::Image,
        AgentType::Video,
    ];

    /// Wire name of the agent type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Orchestrator => "orchestrator",
            AgentType::Researcher => "researcher",
            AgentType::Writer => "writer",
            AgentType::Code => "code",
            AgentType::Image => "image",
            AgentType::Video => "video",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of content carried by a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain or markdown text.
    #[default]
    Text,
    /// An image reference or description.
    Image,
    /// A video reference or description.
    Video,
    /// Source code.
    Code,
    /// A tool invocation request.
    ToolCall,
    /// The result of a tool invocation.
    ToolResult,
}

/// Lifecycle state of an orchestration task.
///
/// `Completed`, `Failed` and `Cancelled` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created from an inbound message, no agent dispatched yet.
    #[default]
    Pending,
    /// At least one agent has been dispatched.
    InProgress,
    /// All required agents finished and the final fragment was emitted.
    Completed,
    /// An unrecoverable agent error occurred.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl TaskStatus {
    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => next != TaskStatus::Pending,
            TaskStatus::InProgress => next.is_terminal(),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A request from an agent to invoke a specific tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// Failure indicator attached to a terminal fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable snake_case error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorInfo {
    /// Creates an error indicator from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A single message exchanged within a session.
///
/// Streamed AI responses are sequences of messages sharing one `id`: every
/// fragment of a response carries the same id and the last one sets
/// `is_final`. Clients append fragment `content` in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier shared by all fragments of one logical response.
    pub id: Uuid,
    /// The orchestration task that produced this message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// The session this message belongs to.
    pub session_id: String,
    /// The authenticated user of the session.
    pub user_id: String,
    /// Textual content (a delta, for streamed fragments).
    pub content: String,
    /// Kind of content.
    #[serde(default)]
    pub message_type: MessageType,
    /// The agent that produced the message. `None` for user messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    /// Status of the producing task at emission time.
    #[serde(default)]
    pub status: TaskStatus,
    /// True exactly once per logical response, on the last fragment.
    #[serde(default)]
    pub is_final: bool,
    /// Tool invocations requested alongside this content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Failure indicator, set only on a failed terminal fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a new message with a fresh id.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: None,
            session_id: session_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            agent_type: None,
            status: TaskStatus::Pending,
            is_final: false,
            tool_calls: Vec::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the producing agent.
    pub fn with_agent(mut self, agent: AgentType) -> Self {
        self.agent_type = Some(agent);
        self
    }

    /// Sets the content kind.
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    /// Sets the producing task.
    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Returns true if this is a user-authored message.
    pub fn is_user(&self) -> bool {
        self.agent_type.is_none()
    }

    /// Returns true if this message carries a failure indicator.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
