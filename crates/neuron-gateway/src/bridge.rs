//! Adapter between transports and the orchestrator.
//!
//! The bridge knows nothing about sockets. It turns a [`ChatRequest`] into a
//! [`SessionHandle`] that yields [`StreamResponse`]s, and a stream of
//! [`StreamRequest`]s into a stream of responses.

use crate::protocol::{RequestPayload, StreamRequest, StreamResponse};
use futures_util::stream::{self, Stream, StreamExt};
use neuron_core::{ChatRequest, ErrorInfo, Message, NeuronResult};
use neuron_orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

const STREAM_BUFFER: usize = 64;

/// Transport-agnostic entry point into the orchestrator.
#[derive(Clone)]
pub struct StreamingBridge {
    orchestrator: Arc<Orchestrator>,
    heartbeat_interval: Duration,
}

/// One logical exchange: the responses for a single user message.
///
/// [`SessionHandle::next`] yields fragments in emission order, interleaved
/// with heartbeats while the task is quiet, and returns `None` after the
/// final fragment.
pub struct SessionHandle {
    task_id: Uuid,
    session_id: String,
    fragments: mpsc::Receiver<Message>,
    heartbeat_interval: Duration,
    finished: bool,
}

impl SessionHandle {
    /// Id of the task this handle follows.
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Session the task was started from.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The next response, or `None` after the final fragment.
    pub async fn next(&mut self) -> Option<StreamResponse> {
        if self.finished {
            return None;
        }

        let received = if self.heartbeat_interval.is_zero() {
            self.fragments.recv().await
        } else {
            match tokio::time::timeout(self.heartbeat_interval, self.fragments.recv()).await {
                Ok(received) => received,
                Err(_) => return Some(StreamResponse::heartbeat(&self.session_id)),
            }
        };

        match received {
            Some(message) => {
                self.finished = message.is_final;
                Some(StreamResponse::fragment(message))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Adapts the handle into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = StreamResponse> + Send {
        stream::unfold(self, |mut handle| async move {
            handle.next().await.map(|response| (response, handle))
        })
    }
}

impl StreamingBridge {
    /// A zero `heartbeat_interval` disables heartbeats.
    pub fn new(orchestrator: Arc<Orchestrator>, heartbeat_interval: Duration) -> Self {
        Self {
            orchestrator,
            heartbeat_interval,
        }
    }

    /// The orchestrator behind the bridge.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Starts a task for `request` and returns its response stream.
    pub async fn open_session(&self, request: ChatRequest) -> NeuronResult<SessionHandle> {
        let handle = self.orchestrator.start(request).await?;
        debug!(
            task_id = %handle.task_id,
            session_id = %handle.session_id,
            "Session opened"
        );
        Ok(SessionHandle {
            task_id: handle.task_id,
            session_id: handle.session_id,
            fragments: handle.fragments,
            heartbeat_interval: self.heartbeat_interval,
            finished: false,
        })
    }

    /// Cancels a task owned by `session_id`. Returns false when there is no
    /// such running task.
    pub fn cancel(&self, task_id: Uuid, session_id: &str) -> bool {
        self.orchestrator.cancel_in_session(task_id, session_id)
    }

    /// Cancels a task regardless of which session started it.
    pub fn cancel_any(&self, task_id: Uuid) -> bool {
        self.orchestrator.cancel(task_id)
    }

    /// Runs one request to completion and returns the merged final message.
    pub async fn process_chat(&self, request: ChatRequest) -> NeuronResult<Message> {
        self.orchestrator.run_to_completion(request).await
    }

    /// Serves a bidirectional stream.
    ///
    /// Chat requests run one at a time in arrival order, each forwarding its
    /// responses up to and including the final fragment. Cancel requests are
    /// applied as soon as they are read, so they can stop the running chat.
    /// The returned receiver closes once the request stream has ended and
    /// every queued chat has finished.
    pub fn process_stream<S>(&self, requests: S) -> mpsc::Receiver<StreamResponse>
    where
        S: Stream<Item = StreamRequest> + Send + Unpin + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(STREAM_BUFFER);
        let (chat_tx, mut chat_rx) = mpsc::channel::<ChatRequest>(STREAM_BUFFER);

        let reader = self.clone();
        tokio::spawn(async move {
            let mut requests = requests;
            while let Some(request) = requests.next().await {
                let StreamRequest {
                    session_id,
                    user_id,
                    payload,
                } = request;
                match payload {
                    RequestPayload::Chat(chat) => {
                        if chat_tx.send(chat.stamped(&user_id, &session_id)).await.is_err() {
                            break;
                        }
                    }
                    RequestPayload::Cancel { task_id } => {
                        let cancelled = reader.cancel(task_id, &session_id);
                        info!(task_id = %task_id, session_id = %session_id, cancelled, "Stream cancel");
                    }
                }
            }
        });

        let worker = self.clone();
        tokio::spawn(async move {
            while let Some(chat) = chat_rx.recv().await {
                let session_id = chat.session_id.clone();
                let user_id = chat.user_id.clone();
                match worker.open_session(chat).await {
                    Ok(mut handle) => {
                        while let Some(response) = handle.next().await {
                            if out_tx.send(response).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let rejected = StreamResponse::rejected(
                            &session_id,
                            &user_id,
                            ErrorInfo::new(e.code(), e.to_string()),
                        );
                        if out_tx.send(rejected).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        out_rx
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use neuron_agent::{AgentRegistry, AgentsConfig};
    use neuron_core::{AgentType, TaskStatus};
    use neuron_orchestrator::{KeywordClassifier, OrchestratorConfig};
    use neuron_session::MemoryMessageStore;

    fn bridge(chunk_delay_ms: u64, heartbeat: Duration) -> StreamingBridge {
        let agents = AgentsConfig { chunk_delay_ms };
        let orchestrator = Orchestrator::new(
            Arc::new(AgentRegistry::with_builtins(&agents)),
            Arc::new(KeywordClassifier::new().unwrap()),
            Arc::new(MemoryMessageStore::new()),
            OrchestratorConfig::default(),
        );
        StreamingBridge::new(orchestrator, heartbeat)
    }

    #[tokio::test]
    async fn test_session_ends_after_final_fragment() {
        let bridge = bridge(0, Duration::ZERO);
        let mut handle = bridge
            .open_session(ChatRequest::new("s", "u", "write a function to reverse a string"))
            .await
            .unwrap();

        let mut responses = Vec::new();
        while let Some(response) = handle.next().await {
            responses.push(response);
        }
        assert!(handle.next().await.is_none());

        let last = responses.last().unwrap();
        assert!(last.is_final);
        assert_eq!(last.message().unwrap().agent_type, Some(AgentType::Writer));
        assert_eq!(responses.iter().filter(|r| r.is_final).count(), 1);
        assert!(responses.iter().all(|r| !r.is_heartbeat));
    }

    #[tokio::test]
    async fn test_heartbeats_while_task_is_quiet() {
        let bridge = bridge(40, Duration::from_millis(10));
        let stream = bridge
            .open_session(ChatRequest::new("s", "u", "hello there"))
            .await
            .unwrap()
            .into_stream();
        let responses: Vec<StreamResponse> = stream.collect().await;

        assert!(responses.iter().any(|r| r.is_heartbeat));
        for beat in responses.iter().filter(|r| r.is_heartbeat) {
            assert!(beat.payload.is_none());
            assert!(!beat.is_final);
            assert_eq!(beat.session_id, "s");
        }
        assert!(responses.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn test_open_session_rejects_invalid_request() {
        let bridge = bridge(0, Duration::ZERO);
        let err = bridge
            .open_session(ChatRequest::new("", "u", "hi"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "unauthorized");
    }

    #[tokio::test]
    async fn test_process_stream_runs_chats_in_order() {
        let bridge = bridge(0, Duration::ZERO);
        let requests = stream::iter(vec![
            StreamRequest::chat(ChatRequest::new("s", "u", "first message")),
            StreamRequest::chat(ChatRequest::new("s", "u", "   ")),
            StreamRequest::chat(ChatRequest::new("s", "u", "second message")),
        ]);
        let mut rx = bridge.process_stream(requests);

        let mut finals = Vec::new();
        while let Some(response) = rx.recv().await {
            if response.is_final {
                finals.push(response.message().unwrap().clone());
            }
        }

        assert_eq!(finals.len(), 3);
        assert_eq!(finals[0].status, TaskStatus::Completed);
        assert_eq!(finals[1].status, TaskStatus::Failed);
        assert_eq!(finals[1].error.as_ref().unwrap().code, "transport_error");
        assert_eq!(finals[2].status, TaskStatus::Completed);
        assert_ne!(finals[0].task_id, finals[2].task_id);
    }

    #[tokio::test]
    async fn test_process_stream_cancel_stops_running_chat() {
        let bridge = bridge(30, Duration::ZERO);
        let (req_tx, req_rx) = mpsc::channel(4);
        let mut rx = bridge.process_stream(request_stream(req_rx));

        req_tx
            .send(StreamRequest::chat(ChatRequest::new(
                "s",
                "u",
                "what is the history of the rust borrow checker and why",
            )))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let task_id = first.message().unwrap().task_id.unwrap();
        req_tx
            .send(StreamRequest::cancel("s", "u", task_id))
            .await
            .unwrap();
        drop(req_tx);

        let mut last = first;
        while let Some(response) = rx.recv().await {
            last = response;
        }
        assert!(last.is_final);
        assert_eq!(last.message().unwrap().status, TaskStatus::Cancelled);
    }

    fn request_stream(
        mut rx: mpsc::Receiver<StreamRequest>,
    ) -> impl Stream<Item = StreamRequest> + Send + Unpin + 'static {
        Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx)))
    }
}
