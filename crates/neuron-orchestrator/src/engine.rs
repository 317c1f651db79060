use crate::classifier::{required_agents, Classifier};
use crate::config::OrchestratorConfig;
use crate::monitor::{TaskMonitor, TaskStats};
use crate::plan::DispatchPlan;
use crate::types::SwarmTask;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, SelectAll, StreamExt};
use neuron_agent::{AgentEvent, AgentInput, AgentRegistry};
use neuron_core::{
    AgentType, ChatRequest, ErrorInfo, Message, MessageType, NeuronError, NeuronResult,
    TaskStatus, ToolCall,
};
use neuron_session::{PersistenceStore, Session};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bookkeeping for a task whose orchestration loop is still running.
struct ActiveTask {
    session_id: String,
    cancel: CancellationToken,
    status: watch::Receiver<TaskStatus>,
    /// Released when the task leaves the active map.
    _permit: OwnedSemaphorePermit,
}

/// Returned by [`Orchestrator::start`]: the task id and its fragment stream.
///
/// The stream yields the task's fragments in emission order and ends right
/// after the single fragment with `is_final = true`.
pub struct TaskHandle {
    /// Id of the started task.
    pub task_id: Uuid,
    /// Session the task belongs to.
    pub session_id: String,
    /// The agents the task was routed through, in order.
    pub required_agents: Vec<AgentType>,
    /// Fragments in emission order.
    pub fragments: mpsc::Receiver<Message>,
}

/// Why a dispatch loop stopped early.
enum Stop {
    Cancelled,
    Failed { agent: AgentType, error: NeuronError },
}

type TaggedEvent = (AgentType, Option<AgentEvent>);

/// The multi-agent orchestrator.
///
/// Classifies each inbound message, drives the selected agents and merges
/// their output into one ordered fragment stream per task.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn PersistenceStore>,
    config: OrchestratorConfig,
    permits: Arc<Semaphore>,
    active: DashMap<Uuid, ActiveTask>,
    sessions: DashMap<String, Session>,
    monitor: TaskMonitor,
}

impl Orchestrator {
    /// Creates an orchestrator with no running tasks.
    pub fn new(
        registry: Arc<AgentRegistry>,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn PersistenceStore>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Arc::new(Self {
            registry,
            classifier,
            store,
            config,
            permits,
            active: DashMap::new(),
            sessions: DashMap::new(),
            monitor: TaskMonitor::new(),
        })
    }

    /// Agents available for dispatch.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Settings the orchestrator was built with.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The agents a request would be routed through.
    pub fn plan_for(&self, request: &ChatRequest) -> Vec<AgentType> {
        required_agents(
            self.classifier.as_ref(),
            &request.content,
            request.message_type,
            &request.metadata,
        )
    }

    /// Creates a task for `request` and starts its orchestration loop.
    ///
    /// Fails only for an invalid request. When the concurrency limit is
    /// reached the handle's stream carries a single failed final fragment
    /// with code `server_busy`.
    pub async fn start(self: &Arc<Self>, request: ChatRequest) -> NeuronResult<TaskHandle> {
        request.validate()?;

        let agents = self.plan_for(&request);
        let mut task = SwarmTask::from_request(&request, agents.clone());
        let task_id = task.task_id;
        let (tx, rx) = mpsc::channel(self.config.fragment_buffer.max(1));
        let handle = TaskHandle {
            task_id,
            session_id: task.session_id.clone(),
            required_agents: agents.clone(),
            fragments: rx,
        };

        let user_write = self.persist(None, request.to_message().with_task(task_id));

        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let err = NeuronError::ServerBusy {
                    active: self.active.len(),
                    max: self.config.max_concurrent_tasks,
                };
                warn!(task_id = %task_id, session_id = %task.session_id, error = %err, "Rejecting task");
                self.monitor.task_rejected();
                task.transition(TaskStatus::Failed);
                let mut relay = Relay::new(&task, tx);
                let last = relay
                    .finish(
                        AgentType::Orchestrator,
                        TaskStatus::Failed,
                        Some(ErrorInfo::new(err.code(), err.to_string())),
                    )
                    .await;
                self.persist(Some(user_write), last);
                return Ok(handle);
            }
        };

        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(TaskStatus::Pending);
        self.active.insert(
            task_id,
            ActiveTask {
                session_id: task.session_id.clone(),
                cancel: cancel.clone(),
                status: status_rx,
                _permit: permit,
            },
        );
        self.sessions
            .entry(task.session_id.clone())
            .or_insert_with(|| Session::new(&task.session_id, &task.user_id))
            .begin_task(task_id);
        self.monitor.task_started();

        info!(
            task_id = %task_id,
            session_id = %task.session_id,
            agents = ?agents,
            "Task started"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive(task, cancel, status_tx, tx, user_write).await;
        });

        Ok(handle)
    }

    /// Runs a request to completion and returns the merged final message:
    /// the final fragment with the concatenated content of the whole stream.
    pub async fn run_to_completion(self: &Arc<Self>, request: ChatRequest) -> NeuronResult<Message> {
        let mut handle = self.start(request).await?;
        let mut content = String::new();
        while let Some(fragment) = handle.fragments.recv().await {
            if fragment.is_final {
                let mut merged = fragment;
                merged.content = content;
                return Ok(merged);
            }
            content.push_str(&fragment.content);
        }
        Err(NeuronError::Orchestrator(format!(
            "task {} ended without a final fragment",
            handle.task_id
        )))
    }

    /// Signals a running task to stop. Returns false if the task is unknown
    /// or already terminal.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        self.cancel_where(task_id, |_| true)
    }

    /// Like [`Orchestrator::cancel`], but only for a task owned by `session_id`.
    pub fn cancel_in_session(&self, task_id: Uuid, session_id: &str) -> bool {
        self.cancel_where(task_id, |task| task.session_id == session_id)
    }

    fn cancel_where(&self, task_id: Uuid, allowed: impl Fn(&ActiveTask) -> bool) -> bool {
        let Some(task) = self.active.get(&task_id) else {
            return false;
        };
        if !allowed(task.value()) || task.status.borrow().is_terminal() {
            return false;
        }
        warn!(task_id = %task_id, session_id = %task.session_id, "Cancel requested");
        task.cancel.cancel();
        true
    }

    /// Status of a task that is still being driven. `None` once it has
    /// finished and been released.
    pub fn task_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.active.get(&task_id).map(|t| *t.status.borrow())
    }

    /// Tasks whose loop is still running.
    pub fn active_task_count(&self) -> usize {
        self.active.len()
    }

    /// The session record, while it has a running task.
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Lifetime task counters.
    pub fn stats(&self) -> TaskStats {
        self.monitor.snapshot()
    }

    /// Appends `message` off the response path, after `after` has landed.
    fn persist(&self, after: Option<JoinHandle<()>>, message: Message) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Some(previous) = after {
                previous.await.ok();
            }
            let message_id = message.id;
            let session_id = message.session_id.clone();
            if let Err(e) = store.append(message).await {
                warn!(message_id = %message_id, session_id = %session_id, error = %e, "Failed to persist message");
            }
        })
    }

    /// The orchestration loop for one task. Owns the task until it is terminal.
    async fn drive(
        self: Arc<Self>,
        mut task: SwarmTask,
        cancel: CancellationToken,
        status: watch::Sender<TaskStatus>,
        tx: mpsc::Sender<Message>,
        user_write: JoinHandle<()>,
    ) {
        let task_id = task.task_id;
        let mut relay = Relay::new(&task, tx);
        // Agents listen on a child token so stragglers can be stopped on
        // failure without the task reading as cancelled.
        let agents_cancel = cancel.child_token();

        let outcome = self
            .dispatch(&mut task, &cancel, &agents_cancel, &mut relay, &status)
            .await;
        agents_cancel.cancel();

        let (agent, next, error) = match outcome {
            Ok(()) => (task.finishing_agent(), TaskStatus::Completed, None),
            Err(Stop::Cancelled) => (AgentType::Orchestrator, TaskStatus::Cancelled, None),
            Err(Stop::Failed { agent, error }) => (
                agent,
                TaskStatus::Failed,
                Some(ErrorInfo::new(error.code(), error.to_string())),
            ),
        };
        task.transition(next);
        status.send_replace(task.status);

        // Release the task before the final fragment goes out, so a client
        // reacting to it never sees this task as still running.
        self.active.remove(&task_id);
        if let Some(mut session) = self.sessions.get_mut(&task.session_id) {
            session.end_task(task_id);
        }
        self.sessions
            .remove_if(&task.session_id, |_, session| session.current_task.is_none());
        self.monitor.task_finished(task.status);

        let mut record = relay.finish(agent, task.status, error).await;
        record.content = relay.content.clone();
        self.persist(Some(user_write), record);

        info!(
            task_id = %task_id,
            session_id = %task.session_id,
            status = %task.status,
            fragments = relay.sent,
            "Task finished"
        );
    }

    async fn dispatch(
        &self,
        task: &mut SwarmTask,
        cancel: &CancellationToken,
        agents_cancel: &CancellationToken,
        relay: &mut Relay,
        status: &watch::Sender<TaskStatus>,
    ) -> Result<(), Stop> {
        let mut plan = DispatchPlan::build(&task.required_agents, &self.registry).map_err(|error| {
            error!(task_id = %task.task_id, error = %error, "Failed to plan task");
            Stop::Failed {
                agent: AgentType::Orchestrator,
                error,
            }
        })?;

        // The coordinating role is recorded, never dispatched.
        if let Some(state) = task.agent_mut(AgentType::Orchestrator) {
            state.finish(&HashMap::new());
        }

        loop {
            if cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            let wave = plan.next_wave(self.config.dispatch_mode);
            if wave.is_empty() {
                if plan.pending_count() > 0 {
                    return Err(Stop::Failed {
                        agent: AgentType::Orchestrator,
                        error: NeuronError::Orchestrator(
                            "pending agents with unmet dependencies".to_string(),
                        ),
                    });
                }
                return Ok(());
            }
            if task.status == TaskStatus::Pending && task.transition(TaskStatus::InProgress) {
                status.send_replace(TaskStatus::InProgress);
            }
            self.run_wave(task, &wave, &mut plan, cancel, agents_cancel, relay)
                .await?;
        }
    }

    /// Starts every agent of `wave` and relays their events until all of
    /// them have completed.
    async fn run_wave(
        &self,
        task: &mut SwarmTask,
        wave: &[AgentType],
        plan: &mut DispatchPlan,
        cancel: &CancellationToken,
        agents_cancel: &CancellationToken,
        relay: &mut Relay,
    ) -> Result<(), Stop> {
        let task_id = task.task_id;
        let mut streams: SelectAll<BoxStream<'static, TaggedEvent>> = SelectAll::new();

        for &agent_type in wave {
            let Some(agent) = self.registry.get(agent_type) else {
                return Err(self.agent_failure(
                    task,
                    agent_type,
                    NeuronError::Orchestrator(format!("no agent registered for {agent_type}")),
                ));
            };
            let input = AgentInput {
                task_id,
                session_id: task.session_id.clone(),
                user_id: task.user_id.clone(),
                description: task.description.clone(),
                message_type: task.message_type,
                metadata: task.metadata.clone(),
                shared_context: task.shared_context.clone(),
                cancel: agents_cancel.clone(),
            };

            plan.mark_running(agent_type);
            if let Some(state) = task.agent_mut(agent_type) {
                state.start(task_id);
            }
            self.monitor.agent_dispatched();
            info!(task_id = %task_id, agent = %agent_type, "Agent dispatched");

            let rx = match agent.run(input).await {
                Ok(rx) => rx,
                Err(e) => return Err(self.agent_failure(task, agent_type, e)),
            };
            streams.push(
                ReceiverStream::new(rx)
                    .map(move |event| (agent_type, Some(event)))
                    .chain(stream::once(async move { (agent_type, None) }))
                    .boxed(),
            );
        }

        let timeout = self.config.agent_timeout();
        let mut finished: HashSet<AgentType> = HashSet::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Stop::Cancelled),
                next = tokio::time::timeout(timeout, streams.next()) => next,
            };

            let (agent_type, event) = match next {
                Ok(Some(item)) => item,
                Ok(None) => return Ok(()),
                Err(_) => {
                    let stalled = wave
                        .iter()
                        .copied()
                        .find(|a| !finished.contains(a))
                        .unwrap_or(AgentType::Orchestrator);
                    return Err(self.agent_failure(
                        task,
                        stalled,
                        NeuronError::AgentTimeout(timeout.as_secs()),
                    ));
                }
            };

            // Anything after an agent's terminal event is dropped.
            if finished.contains(&agent_type) {
                continue;
            }

            match event {
                Some(AgentEvent::Delta {
                    content,
                    message_type,
                }) => {
                    relay
                        .fragment(agent_type, content, message_type, Vec::new(), cancel)
                        .await?;
                }
                Some(AgentEvent::ToolCall { call }) => {
                    relay
                        .fragment(
                            agent_type,
                            String::new(),
                            MessageType::ToolCall,
                            vec![call],
                            cancel,
                        )
                        .await?;
                }
                Some(AgentEvent::Done { outputs }) => {
                    finished.insert(agent_type);
                    task.merge_outputs(&outputs);
                    if let Some(state) = task.agent_mut(agent_type) {
                        state.finish(&outputs);
                    }
                    plan.mark_completed(agent_type);
                    info!(
                        task_id = %task_id,
                        agent = %agent_type,
                        outputs = outputs.len(),
                        "Agent completed"
                    );
                }
                Some(AgentEvent::Error { message }) => {
                    return Err(self.agent_failure(
                        task,
                        agent_type,
                        NeuronError::Agent(format!("{agent_type}: {message}")),
                    ));
                }
                None => {
                    return Err(self.agent_failure(
                        task,
                        agent_type,
                        NeuronError::Agent(format!("{agent_type} stream ended without completing")),
                    ));
                }
            }
        }
    }

    fn agent_failure(&self, task: &mut SwarmTask, agent: AgentType, error: NeuronError) -> Stop {
        error!(task_id = %task.task_id, agent = %agent, error = %error, "Agent failed");
        if let Some(state) = task.agent_mut(agent) {
            state.fail();
        }
        self.monitor.agent_failed();
        Stop::Failed { agent, error }
    }
}

/// Emits a task's fragments under one shared response id.
struct Relay {
    response_id: Uuid,
    task_id: Uuid,
    session_id: String,
    user_id: String,
    tx: mpsc::Sender<Message>,
    /// Everything relayed so far, for the persisted record.
    content: String,
    sent: usize,
    detached: bool,
}

impl Relay {
    fn new(task: &SwarmTask, tx: mpsc::Sender<Message>) -> Self {
        Self {
            response_id: Uuid::new_v4(),
            task_id: task.task_id,
            session_id: task.session_id.clone(),
            user_id: task.user_id.clone(),
            tx,
            content: String::new(),
            sent: 0,
            detached: false,
        }
    }

    fn build(
        &self,
        agent: AgentType,
        content: String,
        message_type: MessageType,
        status: TaskStatus,
    ) -> Message {
        let mut msg = Message::new(&self.session_id, &self.user_id, content)
            .with_agent(agent)
            .with_type(message_type)
            .with_task(self.task_id);
        msg.id = self.response_id;
        msg.status = status;
        msg
    }

    /// Relays one non-final fragment. Refuses once the task is cancelled.
    async fn fragment(
        &mut self,
        agent: AgentType,
        content: String,
        message_type: MessageType,
        tool_calls: Vec<ToolCall>,
        cancel: &CancellationToken,
    ) -> Result<(), Stop> {
        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        self.content.push_str(&content);
        let mut msg = self.build(agent, content, message_type, TaskStatus::InProgress);
        msg.tool_calls = tool_calls;
        self.send(msg).await;
        Ok(())
    }

    /// Emits the single final fragment and returns a copy of it.
    async fn finish(
        &mut self,
        agent: AgentType,
        status: TaskStatus,
        error: Option<ErrorInfo>,
    ) -> Message {
        let mut msg = self.build(agent, String::new(), MessageType::Text, status);
        msg.is_final = true;
        msg.error = error;
        self.send(msg.clone()).await;
        msg
    }

    async fn send(&mut self, msg: Message) {
        if self.detached {
            return;
        }
        if self.tx.send(msg).await.is_err() {
            // Nobody is listening any more; keep driving the task so the
            // result still reaches the store.
            debug!(task_id = %self.task_id, "Fragment receiver dropped");
            self.detached = true;
            return;
        }
        self.sent += 1;
    }
}
