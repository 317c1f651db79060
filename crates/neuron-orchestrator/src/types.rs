use chrono::{DateTime, Utc};
use neuron_core::{AgentType, ChatRequest, MessageType, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// How the agents of one task are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One agent at a time, in the classified order.
    #[default]
    Sequential,
    /// Agents whose dependencies are satisfied run together.
    Parallel,
}

/// Participation status of one agent within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Not started yet.
    Idle,
    /// Producing output.
    Working,
    /// Finished successfully.
    Done,
    /// Failed or timed out.
    Error,
}

/// Ephemeral record of one agent's part in a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Unique per task participation.
    pub agent_id: Uuid,
    /// Which agent this is.
    pub agent_type: AgentType,
    /// Where the agent is in its run.
    pub status: WorkerStatus,
    /// Task the agent is working on, while working.
    pub current_task: Option<Uuid>,
    /// Private scratch space; holds the outputs the agent reported.
    #[serde(default)]
    pub memory: HashMap<String, String>,
}

impl AgentState {
    /// An idle state for `agent_type`.
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_id: Uuid::new_v4(),
            agent_type,
            status: WorkerStatus::Idle,
            current_task: None,
            memory: HashMap::new(),
        }
    }

    /// Marks the agent working on `task_id`.
    pub fn start(&mut self, task_id: Uuid) {
        self.status = WorkerStatus::Working;
        self.current_task = Some(task_id);
    }

    /// Marks the agent done and keeps its outputs.
    pub fn finish(&mut self, outputs: &HashMap<String, String>) {
        self.status = WorkerStatus::Done;
        self.current_task = None;
        self.memory
            .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Marks the agent failed.
    pub fn fail(&mut self) {
        self.status = WorkerStatus::Error;
        self.current_task = None;
    }
}

/// One orchestration run triggered by a user message.
///
/// Owned by the loop that drives it. Nothing else holds a mutable reference,
/// so merges into `shared_context` are never observed half-applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmTask {
    /// Unique task id.
    pub task_id: Uuid,
    /// Originating session.
    pub session_id: String,
    /// Author of the message.
    pub user_id: String,
    /// The user message the task answers.
    pub description: String,
    /// Kind of content the user sent.
    pub message_type: MessageType,
    /// Client-supplied hints.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Classified agents, orchestrator first and writer last.
    pub required_agents: Vec<AgentType>,
    /// Lifecycle status. Only moves forward.
    pub status: TaskStatus,
    /// Outputs of completed agents, visible to later ones.
    #[serde(default)]
    pub shared_context: HashMap<String, String>,
    /// Per-agent state, keyed by type.
    #[serde(default)]
    pub agents: BTreeMap<AgentType, AgentState>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// Set when the task reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SwarmTask {
    /// A pending task for `request`.
    pub fn from_request(request: &ChatRequest, required_agents: Vec<AgentType>) -> Self {
        let now = Utc::now();
        let agents = required_agents
            .iter()
            .map(|a| (*a, AgentState::new(*a)))
            .collect();
        Self {
            task_id: Uuid::new_v4(),
            session_id: request.session_id.clone(),
            user_id: request.user_id.clone(),
            description: request.content.clone(),
            message_type: request.message_type,
            metadata: request.metadata.clone(),
            required_agents,
            status: TaskStatus::Pending,
            shared_context: HashMap::new(),
            agents,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Moves to `next` if the state machine allows it. Returns false when the
    /// transition is refused, e.g. out of a terminal state.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        true
    }

    /// True once the task has completed, failed or been cancelled.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies one agent's outputs to the shared context in a single step.
    pub fn merge_outputs(&mut self, outputs: &HashMap<String, String>) {
        self.shared_context
            .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.updated_at = Utc::now();
    }

    /// The last agent in the required list: the synthesizing role.
    pub fn finishing_agent(&self) -> AgentType {
        self.required_agents
            .last()
            .copied()
            .unwrap_or(AgentType::Orchestrator)
    }

    /// Mutable state of one participating agent.
    pub fn agent_mut(&mut self, agent_type: AgentType) -> Option<&mut AgentState> {
        self.agents.get_mut(&agent_type)
    }
}
