//! Multi-agent dispatch for the Neuron gateway.
//!
//! Every inbound chat message becomes a [`SwarmTask`]. The [`Orchestrator`]
//! classifies it, builds a [`DispatchPlan`], drives the selected agents and
//! relays their output as one ordered fragment stream that ends with exactly
//! one final fragment.
//!
//! # Main types
//!
//! - [`Orchestrator`]: task lifecycle, dispatch loop, cancellation.
//! - [`Classifier`] / [`KeywordClassifier`]: picks the supplementary agents.
//! - [`DispatchPlan`]: dependency-ordered agent steps.
//! - [`TaskMonitor`]: lifetime task and agent counters.

/// Content classification.
pub mod classifier;
/// `[orchestrator]` settings.
pub mod config;
/// The orchestration engine.
pub mod engine;
/// Task counters.
pub mod monitor;
/// Dependency-ordered dispatch plans.
pub mod plan;
/// Task and agent state.
pub mod types;

pub use classifier::{required_agents, Classifier, KeywordClassifier, AGENTS_HINT};
pub use config::OrchestratorConfig;
pub use engine::{Orchestrator, TaskHandle};
pub use monitor::{TaskMonitor, TaskStats};
pub use plan::{DispatchPlan, PlanStep};
pub use types::{AgentState, DispatchMode, SwarmTask, WorkerStatus};
