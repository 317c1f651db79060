use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the builtin agents (`[agents]` in `neuron.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Pause between two streamed fragments, in milliseconds.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

fn default_chunk_delay_ms() -> u64 {
    15
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

impl AgentsConfig {
    /// `chunk_delay_ms` as a [`Duration`].
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}
