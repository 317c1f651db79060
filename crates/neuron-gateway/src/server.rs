use crate::bridge::StreamingBridge;
use crate::config::GatewayConfig;
use crate::connection::serve_connection;
use crate::hub::ConnectionHub;
use crate::middleware::{credential, error_response, Authenticator, IdentityQuery};
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use neuron_core::{ChatRequest, NeuronError};
use neuron_orchestrator::Orchestrator;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    /// Live WebSocket connections.
    pub hub: Arc<ConnectionHub>,
    /// Adapter used by the HTTP endpoints.
    pub bridge: StreamingBridge,
    /// Task engine.
    pub orchestrator: Arc<Orchestrator>,
    /// Resolves credentials to user ids.
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Wires the bridge and the hub around `orchestrator`.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        authenticator: Arc<dyn Authenticator>,
        config: GatewayConfig,
    ) -> Arc<Self> {
        let bridge = StreamingBridge::new(Arc::clone(&orchestrator), config.heartbeat_interval());
        let hub = ConnectionHub::new(bridge.clone(), config);
        Arc::new(Self {
            hub,
            bridge,
            orchestrator,
            authenticator,
        })
    }
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// The router with every gateway route.
    pub fn build(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/api/chat", post(chat_handler))
            .route("/api/tasks/{task_id}/cancel", post(cancel_handler))
            .with_state(state)
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "neuron",
        "connections": state.hub.connection_count(),
        "active_tasks": state.orchestrator.active_task_count(),
        "stats": state.orchestrator.stats(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdentityQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = query.session().map(str::to_string) else {
        return error_response(&NeuronError::Transport("session_id is required".to_string()));
    };
    let user_id = match state
        .authenticator
        .authenticate(credential(&headers, &query), query.user_id.as_deref())
        .await
    {
        Ok(user_id) => user_id,
        Err(e) => return error_response(&e),
    };

    info!(session_id = %session_id, user_id = %user_id, "WebSocket upgrade");
    let hub = Arc::clone(&state.hub);
    ws.max_message_size(hub.config().max_message_size)
        .on_upgrade(move |socket| serve_connection(socket, hub, user_id, session_id))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdentityQuery>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let claimed = Some(request.user_id.as_str()).filter(|u| !u.is_empty());
    let user_id = match state
        .authenticator
        .authenticate(credential(&headers, &query), claimed.or(query.user_id.as_deref()))
        .await
    {
        Ok(user_id) => user_id,
        Err(e) => return error_response(&e),
    };
    let session_id = match query.session() {
        Some(session_id) => session_id.to_string(),
        None if !request.session_id.is_empty() => request.session_id.clone(),
        None => {
            return error_response(&NeuronError::Transport("session_id is required".to_string()));
        }
    };

    let request = request.stamped(&user_id, &session_id);
    match state.bridge.process_chat(request).await {
        Ok(message) => Json(message).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<IdentityQuery>,
    headers: HeaderMap,
) -> Response {
    let user_id = match state
        .authenticator
        .authenticate(credential(&headers, &query), query.user_id.as_deref())
        .await
    {
        Ok(user_id) => user_id,
        Err(e) => return error_response(&e),
    };
    let Some(session_id) = query.session() else {
        return error_response(&NeuronError::Transport("session_id is required".to_string()));
    };

    let owned = state
        .orchestrator
        .session(session_id)
        .is_some_and(|session| session.user_id == user_id);
    if owned && state.bridge.cancel(task_id, session_id) {
        return Json(serde_json::json!({ "task_id": task_id, "cancelled": true })).into_response();
    }

    let body = serde_json::json!({
        "error": {
            "code": "task_not_found",
            "message": format!("no running task {task_id} in session {session_id}"),
        }
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
