use crate::agent::Agent;
use crate::builtin::BuiltinAgent;
use crate::config::AgentsConfig;
use neuron_core::AgentType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Central registry for the agents the orchestrator can dispatch.
pub struct AgentRegistry {
    agents: HashMap<AgentType, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// A registry holding every builtin agent.
    pub fn with_builtins(config: &AgentsConfig) -> Self {
        let mut registry = Self::new();
        for agent in BuiltinAgent::all(config) {
            registry.register(Arc::new(agent));
        }
        registry
    }

    /// Registers an agent, replacing any previous agent of the same type.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let agent_type = agent.agent_type();
        info!(agent = %agent_type, "Registered agent");
        self.agents.insert(agent_type, agent);
    }

    /// The agent registered for `agent_type`.
    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn Agent>> {
        self.agents.get(&agent_type).cloned()
    }

    /// True if an agent is registered for `agent_type`.
    pub fn contains(&self, agent_type: AgentType) -> bool {
        self.agents.contains_key(&agent_type)
    }

    /// Registered types in declaration order.
    pub fn types(&self) -> Vec<AgentType> {
        let mut types: Vec<AgentType> = self.agents.keys().copied().collect();
        types.sort();
        types
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// True when no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
