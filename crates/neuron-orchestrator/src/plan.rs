use crate::types::DispatchMode;
use neuron_agent::AgentRegistry;
use neuron_core::{AgentType, NeuronError, NeuronResult};
use std::collections::HashMap;

/// One agent invocation within a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// The agent this step runs.
    pub agent: AgentType,
    /// Agents of the same plan that must finish first.
    pub dependencies: Vec<AgentType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Pending,
    Running,
    Completed,
}

/// Dependency-ordered dispatch plan for one task.
///
/// Steps keep the classified order; dependencies only refer to agents that
/// are part of the same plan, so an agent never waits on one that will not run.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    steps: Vec<PlanStep>,
    states: Vec<StepState>,
}

impl DispatchPlan {
    /// Builds the plan for `required`, skipping the coordinating role, which
    /// is never dispatched as an agent.
    pub fn build(required: &[AgentType], registry: &AgentRegistry) -> NeuronResult<Self> {
        let dispatched: Vec<AgentType> = required
            .iter()
            .copied()
            .filter(|a| *a != AgentType::Orchestrator)
            .collect();

        let mut steps = Vec::with_capacity(dispatched.len());
        for agent_type in &dispatched {
            let agent = registry.get(*agent_type).ok_or_else(|| {
                NeuronError::Orchestrator(format!("no agent registered for {agent_type}"))
            })?;
            let dependencies = agent
                .depends_on()
                .into_iter()
                .filter(|d| d != agent_type && dispatched.contains(d))
                .collect();
            steps.push(PlanStep {
                agent: *agent_type,
                dependencies,
            });
        }

        let plan = Self::from_steps(steps);
        if plan.has_cycle() {
            return Err(NeuronError::Orchestrator(
                "dependency cycle detected in agent plan".to_string(),
            ));
        }
        Ok(plan)
    }

    /// A plan over explicit steps, without registry lookups.
    pub fn from_steps(steps: Vec<PlanStep>) -> Self {
        let states = vec![StepState::Pending; steps.len()];
        Self { steps, states }
    }

    /// Steps in plan order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    fn completed(&self) -> Vec<AgentType> {
        self.steps
            .iter()
            .zip(&self.states)
            .filter(|(_, s)| **s == StepState::Completed)
            .map(|(step, _)| step.agent)
            .collect()
    }

    /// Every pending step whose dependencies have all completed, in plan order.
    pub fn all_ready(&self) -> Vec<AgentType> {
        let completed = self.completed();
        self.steps
            .iter()
            .zip(&self.states)
            .filter(|(step, state)| {
                **state == StepState::Pending
                    && step.dependencies.iter().all(|d| completed.contains(d))
            })
            .map(|(step, _)| step.agent)
            .collect()
    }

    /// The agents to start next: the first ready step in sequential mode,
    /// every ready step in parallel mode.
    pub fn next_wave(&self, mode: DispatchMode) -> Vec<AgentType> {
        let mut ready = self.all_ready();
        if mode == DispatchMode::Sequential {
            ready.truncate(1);
        }
        ready
    }

    /// Returns false unless `agent` was pending.
    pub fn mark_running(&mut self, agent: AgentType) -> bool {
        self.set_state(agent, StepState::Running)
    }

    /// Returns false unless `agent` was pending or running.
    pub fn mark_completed(&mut self, agent: AgentType) -> bool {
        self.set_state(agent, StepState::Completed)
    }

    fn set_state(&mut self, agent: AgentType, state: StepState) -> bool {
        match self.steps.iter().position(|s| s.agent == agent) {
            Some(i) => {
                self.states[i] = state;
                true
            }
            None => false,
        }
    }

    /// Steps not yet started.
    pub fn pending_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| **s == StepState::Pending)
            .count()
    }

    /// True once every step has completed.
    pub fn is_done(&self) -> bool {
        self.states.iter().all(|s| *s == StepState::Completed)
    }

    /// Check for cycles in the dependency graph.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashMap::new();
        for step in &self.steps {
            if self.dfs_cycle(step.agent, &mut visited) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(&self, agent: AgentType, visited: &mut HashMap<AgentType, u8>) -> bool {
        match visited.get(&agent) {
            Some(1) => return true,  // back edge
            Some(2) => return false, // already processed
            _ => {}
        }
        visited.insert(agent, 1);
        if let Some(step) = self.steps.iter().find(|s| s.agent == agent) {
            for dep in &step.dependencies {
                if self.dfs_cycle(*dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(agent, 2);
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use neuron_agent::AgentsConfig;

    fn builtins() -> AgentRegistry {
        AgentRegistry::with_builtins(&AgentsConfig { chunk_delay_ms: 0 })
    }

    fn step(agent: AgentType, dependencies: Vec<AgentType>) -> PlanStep {
        PlanStep {
            agent,
            dependencies,
        }
    }

    #[test]
    fn test_build_skips_orchestrator_and_scopes_dependencies() {
        let plan = DispatchPlan::build(
            &[AgentType::Orchestrator, AgentType::Code, AgentType::Writer],
            &builtins(),
        )
        .unwrap();

        assert_eq!(plan.steps().len(), 2);
        assert_eq!(plan.steps()[0], step(AgentType::Code, vec![]));
        assert_eq!(plan.steps()[1], step(AgentType::Writer, vec![AgentType::Code]));
    }

    #[test]
    fn test_build_rejects_unregistered_agent() {
        let err = DispatchPlan::build(
            &[AgentType::Orchestrator, AgentType::Writer],
            &AgentRegistry::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "orchestrator_error");
    }

    #[test]
    fn test_sequential_waves_follow_plan_order() {
        let mut plan = DispatchPlan::build(
            &[
                AgentType::Orchestrator,
                AgentType::Researcher,
                AgentType::Image,
                AgentType::Writer,
            ],
            &builtins(),
        )
        .unwrap();

        let mut order = Vec::new();
        loop {
            let wave = plan.next_wave(DispatchMode::Sequential);
            if wave.is_empty() {
                break;
            }
            assert_eq!(wave.len(), 1);
            plan.mark_running(wave[0]);
            plan.mark_completed(wave[0]);
            order.push(wave[0]);
        }
        assert_eq!(
            order,
            vec![AgentType::Researcher, AgentType::Image, AgentType::Writer]
        );
        assert!(plan.is_done());
    }

    #[test]
    fn test_parallel_wave_holds_back_dependents() {
        let mut plan = DispatchPlan::build(
            &[
                AgentType::Orchestrator,
                AgentType::Researcher,
                AgentType::Code,
                AgentType::Writer,
            ],
            &builtins(),
        )
        .unwrap();

        let first = plan.next_wave(DispatchMode::Parallel);
        assert_eq!(first, vec![AgentType::Researcher, AgentType::Code]);
        plan.mark_running(AgentType::Researcher);
        plan.mark_running(AgentType::Code);
        assert!(plan.next_wave(DispatchMode::Parallel).is_empty());

        plan.mark_completed(AgentType::Researcher);
        assert!(plan.next_wave(DispatchMode::Parallel).is_empty());
        plan.mark_completed(AgentType::Code);
        assert_eq!(
            plan.next_wave(DispatchMode::Parallel),
            vec![AgentType::Writer]
        );
        assert_eq!(plan.pending_count(), 1);
    }

    #[test]
    fn test_cycle_detection() {
        let plan = DispatchPlan::from_steps(vec![
            step(AgentType::Code, vec![AgentType::Writer]),
            step(AgentType::Writer, vec![AgentType::Code]),
        ]);
        assert!(plan.has_cycle());
        assert!(plan.all_ready().is_empty());

        let plan = DispatchPlan::from_steps(vec![
            step(AgentType::Code, vec![]),
            step(AgentType::Writer, vec![AgentType::Code]),
        ]);
        assert!(!plan.has_cycle());
    }
}
