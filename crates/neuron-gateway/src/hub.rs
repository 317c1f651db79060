use crate::bridge::StreamingBridge;
use crate::config::GatewayConfig;
use crate::protocol::{ClientFrame, ServerFrame, StreamResponse};
use dashmap::DashMap;
use neuron_core::{ChatRequest, ErrorInfo, NeuronError, NeuronResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a non-blocking enqueue onto a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame is in the queue.
    Queued,
    /// The consumer is not keeping up.
    Full,
    /// The connection is gone.
    Closed,
}

/// One live client connection, bound to a single session and user.
pub struct ClientConnection {
    /// Unique per connection.
    pub id: Uuid,
    /// Authenticated user.
    pub user_id: String,
    /// Session the connection is bound to.
    pub session_id: String,
    tx: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    closed: CancellationToken,
    last_activity: Mutex<Instant>,
    awaiting_pong: AtomicBool,
}

impl ClientConnection {
    /// Creates a connection and the receiving end of its outbound queue.
    pub fn new(
        user_id: &str,
        session_id: &str,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            tx: Mutex::new(Some(tx)),
            closed: CancellationToken::new(),
            last_activity: Mutex::new(Instant::now()),
            awaiting_pong: AtomicBool::new(false),
        });
        (conn, rx)
    }

    /// Enqueues `frame` without waiting.
    pub fn try_send(&self, frame: Arc<str>) -> SendOutcome {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return SendOutcome::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => SendOutcome::Full,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Drops the outbound queue, then signals closure. Returns true only for
    /// the call that actually closed the connection.
    pub fn close(&self) -> bool {
        let sender = self.tx.lock().take();
        self.closed.cancel();
        sender.is_some()
    }

    /// True once [`ClientConnection::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Resets the idle timer.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Records an outgoing keepalive probe. Returns true if the previous
    /// probe was never acknowledged.
    pub fn mark_ping_sent(&self) -> bool {
        self.awaiting_pong.swap(true, Ordering::AcqRel)
    }

    /// Acknowledges the outstanding keepalive probe.
    pub fn mark_pong(&self) {
        self.awaiting_pong.store(false, Ordering::Release);
        self.touch();
    }
}

/// Outcome of one [`ConnectionHub::deliver`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the frame was queued on.
    pub delivered: usize,
    /// Connections unregistered because their queue was full or closed.
    pub dropped: usize,
}

/// Owns every live connection, grouped by session.
///
/// This map is the only structure mutated by many independent connection
/// loops. Delivery clones the target list out of the map before enqueueing,
/// so no shard lock is held while touching a connection.
pub struct ConnectionHub {
    sessions: DashMap<String, HashMap<Uuid, Arc<ClientConnection>>>,
    bridge: StreamingBridge,
    config: GatewayConfig,
}

impl ConnectionHub {
    /// Creates an empty hub.
    pub fn new(bridge: StreamingBridge, config: GatewayConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            bridge,
            config,
        })
    }

    /// Gateway settings the hub was built with.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The bridge chats are routed through.
    pub fn bridge(&self) -> &StreamingBridge {
        &self.bridge
    }

    /// Adds a connection for an already authenticated identity and queues its
    /// `connected` frame. Other connections of the same session are kept.
    pub fn register(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> NeuronResult<(Arc<ClientConnection>, mpsc::Receiver<Arc<str>>)> {
        if user_id.is_empty() || session_id.is_empty() {
            return Err(NeuronError::Auth(
                "connection requires user_id and session_id".to_string(),
            ));
        }

        let (conn, rx) =
            ClientConnection::new(user_id, session_id, self.config.send_queue_capacity);
        let welcome = ServerFrame::Connected {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            connection_id: conn.id,
        }
        .to_text()?;
        conn.try_send(welcome.into());

        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(conn.id, Arc::clone(&conn));

        info!(
            connection_id = %conn.id,
            session_id = %session_id,
            user_id = %user_id,
            "Connection registered"
        );
        Ok((conn, rx))
    }

    /// Removes and closes a connection. Safe to call any number of times.
    pub fn unregister(&self, conn: &ClientConnection) {
        let removed = {
            match self.sessions.get_mut(&conn.session_id) {
                Some(mut conns) => conns.remove(&conn.id).is_some(),
                None => false,
            }
        };
        self.sessions
            .remove_if(&conn.session_id, |_, conns| conns.is_empty());
        let closed = conn.close();

        if removed || closed {
            info!(
                connection_id = %conn.id,
                session_id = %conn.session_id,
                "Connection unregistered"
            );
        }
    }

    /// Enqueues `frame` on every connection of `session_id` without waiting.
    /// Connections whose queue is full are dropped.
    pub fn deliver(&self, session_id: &str, frame: &ServerFrame) -> NeuronResult<DeliveryReport> {
        let text: Arc<str> = frame.to_text()?.into();
        Ok(self.deliver_text(session_id, text))
    }

    fn deliver_text(&self, session_id: &str, text: Arc<str>) -> DeliveryReport {
        let targets: Vec<Arc<ClientConnection>> = match self.sessions.get(session_id) {
            Some(conns) => conns.values().cloned().collect(),
            None => return DeliveryReport::default(),
        };

        let mut report = DeliveryReport::default();
        for conn in &targets {
            match conn.try_send(Arc::clone(&text)) {
                SendOutcome::Queued => report.delivered += 1,
                SendOutcome::Full => {
                    warn!(
                        connection_id = %conn.id,
                        session_id = %session_id,
                        "Dropping slow consumer"
                    );
                    self.unregister(conn);
                    report.dropped += 1;
                }
                SendOutcome::Closed => {
                    self.unregister(conn);
                    report.dropped += 1;
                }
            }
        }
        report
    }

    /// Enqueues `frame` on one connection only.
    pub fn send_to(&self, conn: &ClientConnection, frame: &ServerFrame) -> SendOutcome {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(connection_id = %conn.id, error = %e, "Failed to encode frame");
                return SendOutcome::Closed;
            }
        };
        let outcome = conn.try_send(text.into());
        if outcome == SendOutcome::Full {
            warn!(connection_id = %conn.id, session_id = %conn.session_id, "Dropping slow consumer");
            self.unregister(conn);
        }
        outcome
    }

    /// Handles one text frame read from `conn`.
    ///
    /// Identity always comes from the connection, never from the payload.
    /// Chat work runs on its own task so the read loop keeps reading.
    pub fn handle_inbound(self: &Arc<Self>, conn: &Arc<ClientConnection>, raw: &str) {
        conn.touch();
        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(connection_id = %conn.id, code = %e.code, error = %e.message, "Rejected frame");
                self.send_to(conn, &ServerFrame::error(e.code, e.message));
                return;
            }
        };

        match frame {
            ClientFrame::Heartbeat => {}
            ClientFrame::Error { code, message } => {
                warn!(connection_id = %conn.id, session_id = %conn.session_id, code = %code, message = %message, "Client reported error");
            }
            ClientFrame::Ping => {
                let beat = StreamResponse::heartbeat(&conn.session_id);
                self.send_to(conn, &ServerFrame::from_response(beat));
            }
            ClientFrame::Cancel { task_id } => {
                if !self.bridge.cancel(task_id, &conn.session_id) {
                    self.send_to(
                        conn,
                        &ServerFrame::error(
                            "task_not_found",
                            format!("no running task {task_id} in this session"),
                        ),
                    );
                }
            }
            ClientFrame::Chat(request) => {
                let request = request.stamped(&conn.user_id, &conn.session_id);
                if let Err(e) = request.validate() {
                    self.send_to(conn, &ServerFrame::error(e.code(), e.to_string()));
                    return;
                }
                let hub = Arc::clone(self);
                tokio::spawn(async move {
                    hub.stream_chat(request).await;
                });
            }
        }
    }

    /// Relays every response of one chat to all connections of its session.
    async fn stream_chat(&self, request: ChatRequest) {
        let session_id = request.session_id.clone();
        let user_id = request.user_id.clone();

        let mut handle = match self.bridge.open_session(request).await {
            Ok(handle) => handle,
            Err(e) => {
                let rejected = StreamResponse::rejected(
                    &session_id,
                    &user_id,
                    ErrorInfo::new(e.code(), e.to_string()),
                );
                self.deliver_response(&session_id, rejected);
                return;
            }
        };

        while let Some(response) = handle.next().await {
            self.deliver_response(&session_id, response);
        }
        debug!(task_id = %handle.task_id(), session_id = %session_id, "Chat stream finished");
    }

    fn deliver_response(&self, session_id: &str, response: StreamResponse) {
        if let Err(e) = self.deliver(session_id, &ServerFrame::from_response(response)) {
            warn!(session_id = %session_id, error = %e, "Failed to deliver response");
        }
    }

    /// Live connections across all sessions.
    pub fn connection_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Live connections bound to `session_id`.
    pub fn session_connection_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map_or(0, |conns| conns.len())
    }
}
