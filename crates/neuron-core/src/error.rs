use thiserror::Error;

/// A convenience `Result` alias using [`NeuronError`].
pub type NeuronResult<T> = Result<T, NeuronError>;

/// Top-level error type for the Neuron gateway.
///
/// Each variant corresponds to a subsystem that can produce errors. Only
/// agent and orchestrator errors ever reach a task's status; transport and
/// auth errors stay local to one connection.
#[derive(Error, Debug)]
pub enum NeuronError {
    /// An agent failed to produce a result.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An agent produced no event within the configured idle timeout.
    #[error("Agent timed out after {0}s without output")]
    AgentTimeout(u64),

    /// An error from the orchestration loop itself (planning, dispatch).
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// The orchestrator is already running its maximum number of tasks.
    #[error("Server busy: {active} tasks running (max {max})")]
    ServerBusy {
        /// Tasks currently running.
        active: usize,
        /// Configured limit.
        max: usize,
    },

    /// An error from the HTTP/WebSocket gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A malformed, oversized or unexpected frame on one connection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing or invalid identity at registration.
    #[error("Auth error: {0}")]
    Auth(String),

    /// An error related to session persistence or lookup.
    #[error("Session error: {0}")]
    Session(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NeuronError {
    /// Stable snake_case code carried in failure fragments and error frames.
    pub fn code(&self) -> &'static str {
        match self {
            NeuronError::Agent(_) => "agent_error",
            NeuronError::AgentTimeout(_) => "agent_timeout",
            NeuronError::Orchestrator(_) => "orchestrator_error",
            NeuronError::ServerBusy { .. } => "server_busy",
            NeuronError::Gateway(_) => "gateway_error",
            NeuronError::Transport(_) => "transport_error",
            NeuronError::Auth(_) => "unauthorized",
            NeuronError::Session(_) => "session_error",
            NeuronError::Config(_) => "config_error",
            NeuronError::Serialization(_) => "invalid_json",
            NeuronError::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(NeuronError::Agent("boom".into()).code(), "agent_error");
        assert_eq!(NeuronError::AgentTimeout(300).code(), "agent_timeout");
        assert_eq!(
            NeuronError::ServerBusy { active: 10, max: 10 }.code(),
            "server_busy"
        );
        assert_eq!(NeuronError::Auth("missing key".into()).code(), "unauthorized");
    }

    #[test]
    fn test_error_display() {
        let err = NeuronError::ServerBusy { active: 3, max: 3 };
        assert_eq!(err.to_string(), "Server busy: 3 tasks running (max 3)");
        assert_eq!(
            NeuronError::AgentTimeout(5).to_string(),
            "Agent timed out after 5s without output"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: NeuronError = parse.unwrap_err().into();
        assert_eq!(err.code(), "invalid_json");
    }
}
