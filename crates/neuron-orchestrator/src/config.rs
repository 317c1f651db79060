use crate::types::DispatchMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator settings (`[orchestrator]` in `neuron.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Sequential or parallel agent scheduling.
    #[serde(default)]
    pub dispatch_mode: DispatchMode,
    /// Seconds an agent may go without producing an event.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    /// Orchestration loops allowed to run at once.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Capacity of each task's outbound fragment channel.
    #[serde(default = "default_fragment_buffer")]
    pub fragment_buffer: usize,
}

fn default_agent_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_fragment_buffer() -> usize {
    64
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_mode: DispatchMode::default(),
            agent_timeout_secs: default_agent_timeout_secs(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            fragment_buffer: default_fragment_buffer(),
        }
    }
}

impl OrchestratorConfig {
    /// `agent_timeout_secs` as a [`Duration`].
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
dispatch_mode = "parallel"
max_concurrent_tasks = 2
"#,
        )
        .unwrap();
        assert_eq!(config.dispatch_mode, DispatchMode::Parallel);
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.agent_timeout(), Duration::from_secs(300));
        assert_eq!(config.fragment_buffer, 64);
    }
}
