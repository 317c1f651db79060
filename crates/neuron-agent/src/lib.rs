//! The agent contract and the builtin agents.
//!
//! An [`Agent`] consumes a task description plus a snapshot of the task's
//! shared context and produces a finite stream of [`AgentEvent`]s: zero or
//! more fragments followed by exactly one terminal event.

/// The agent trait and its input.
pub mod agent;
/// Deterministic builtin agents.
pub mod builtin;
/// `[agents]` settings.
pub mod config;
/// Agent lookup by type.
pub mod registry;
/// Agent event stream.
pub mod stream;

pub use agent::{Agent, AgentInput};
pub use builtin::BuiltinAgent;
pub use config::AgentsConfig;
pub use registry::AgentRegistry;
pub use stream::{AgentEvent, AgentStream};
