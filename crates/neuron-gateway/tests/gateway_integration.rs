#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures_util::{SinkExt, StreamExt};
use neuron_agent::{AgentRegistry, AgentsConfig};
use neuron_gateway::{ApiKeyAuthenticator, AppState, GatewayConfig, GatewayServer};
use neuron_orchestrator::{KeywordClassifier, Orchestrator, OrchestratorConfig};
use neuron_session::MemoryMessageStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{self, Message};

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: String,
    store: Arc<MemoryMessageStore>,
}

/// Helper: build a test server on a random port.
async fn start_server(
    api_keys: HashMap<String, String>,
    chunk_delay_ms: u64,
    gateway: GatewayConfig,
) -> TestServer {
    let store = Arc::new(MemoryMessageStore::new());
    let orchestrator = Orchestrator::new(
        Arc::new(AgentRegistry::with_builtins(&AgentsConfig { chunk_delay_ms })),
        Arc::new(KeywordClassifier::new().unwrap()),
        store.clone(),
        OrchestratorConfig::default(),
    );
    let auth = Arc::new(ApiKeyAuthenticator::new(api_keys));
    let app = GatewayServer::build(AppState::new(orchestrator, auth, gateway));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let addr = format!("127.0.0.1:{}", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Small yield to let the server task start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { addr, store }
}

async fn start_test_server() -> TestServer {
    start_server(HashMap::new(), 0, GatewayConfig::default()).await
}

/// Connect as `user` to `session` and consume the welcome frame.
async fn connect_ws(addr: &str, session: &str, user: &str) -> (Ws, serde_json::Value) {
    let url = format!("ws://{addr}/ws?session_id={session}&user_id={user}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let welcome = next_frame(&mut ws).await;
    assert_eq!(welcome["type"], "connected");
    (ws, welcome)
}

/// Next text frame, skipping control frames.
async fn next_frame(ws: &mut Ws) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Frames up to and including the final chat fragment, heartbeats skipped.
async fn read_response(ws: &mut Ws) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(ws).await;
        if frame["type"] == "heartbeat" {
            continue;
        }
        assert_eq!(frame["type"], "chat", "unexpected frame {frame}");
        let is_final = frame["payload"]["is_final"] == true;
        frames.push(frame);
        if is_final {
            return frames;
        }
    }
}

async fn send_json(ws: &mut Ws, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn chat(content: &str) -> serde_json::Value {
    serde_json::json!({ "type": "chat", "payload": { "content": content } })
}

fn fragment(frame: &serde_json::Value) -> &serde_json::Value {
    &frame["payload"]["payload"]["chat"]
}

fn contents(frames: &[serde_json::Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| fragment(f)["content"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = start_test_server().await;
    let resp = reqwest::get(format!("http://{}/health", server.addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "neuron");
    assert_eq!(body["connections"], 0);
    assert_eq!(body["active_tasks"], 0);
}

#[tokio::test]
async fn test_websocket_connect_and_welcome() {
    let server = start_test_server().await;
    let (_ws, welcome) = connect_ws(&server.addr, "sess-1", "alice").await;

    assert_eq!(welcome["payload"]["session_id"], "sess-1");
    assert_eq!(welcome["payload"]["user_id"], "alice");
    assert!(welcome["payload"]["connection_id"].is_string());

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["connections"], 1);
}

#[tokio::test]
async fn test_websocket_without_session_is_rejected() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws?user_id=alice", server.addr);
    match tokio_tungstenite::connect_async(&url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 400),
        other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_websocket_auth() {
    let keys = HashMap::from([("secret-key".to_string(), "alice".to_string())]);
    let server = start_server(keys, 0, GatewayConfig::default()).await;

    let url = format!("ws://{}/ws?session_id=s&api_key=wrong", server.addr);
    match tokio_tungstenite::connect_async(&url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        other => panic!("expected HTTP 401, got {:?}", other.map(|_| ())),
    }

    let url = format!("ws://{}/ws?session_id=s", server.addr);
    match tokio_tungstenite::connect_async(&url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        other => panic!("expected HTTP 401, got {:?}", other.map(|_| ())),
    }

    // The key decides the identity, not the claimed user id.
    let url = format!("ws://{}/ws?session_id=s&user_id=mallory&api_key=secret-key", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let welcome = next_frame(&mut ws).await;
    assert_eq!(welcome["payload"]["user_id"], "alice");
}

#[tokio::test]
async fn test_chat_streams_fragments_until_final() {
    let server = start_test_server().await;
    let (mut ws, _) = connect_ws(&server.addr, "sess-1", "alice").await;

    let mut request = chat("write a function to reverse a string");
    request["payload"]["user_id"] = "mallory".into();
    send_json(&mut ws, request).await;

    let frames = read_response(&mut ws).await;
    assert!(frames.len() > 1);

    let response_id = fragment(&frames[0])["id"].clone();
    for frame in &frames {
        assert_eq!(fragment(frame)["id"], response_id);
        assert_eq!(fragment(frame)["user_id"], "alice");
        assert_eq!(frame["payload"]["session_id"], "sess-1");
    }
    let last = frames.last().unwrap();
    assert_eq!(fragment(last)["agent_type"], "writer");
    assert_eq!(fragment(last)["status"], "completed");
    assert!(frames.iter().any(|f| fragment(f)["agent_type"] == "code"));

    // Nothing for the task follows the final fragment.
    send_json(&mut ws, serde_json::json!({ "type": "ping" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "heartbeat");

    // The client-side concatenation matches what was persisted.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let streamed: String = frames
        .iter()
        .map(|f| fragment(f)["content"].as_str().unwrap())
        .collect();
    let persisted = server
        .store
        .messages()
        .into_iter()
        .find(|m| m.is_final)
        .unwrap();
    assert_eq!(persisted.content, streamed);
}

#[tokio::test]
async fn test_ping_gets_heartbeat() {
    let server = start_test_server().await;
    let (mut ws, _) = connect_ws(&server.addr, "sess-1", "alice").await;

    send_json(&mut ws, serde_json::json!({ "type": "ping" })).await;
    let beat = next_frame(&mut ws).await;
    assert_eq!(beat["type"], "heartbeat");
    assert_eq!(beat["payload"]["is_heartbeat"], true);
    assert!(beat["payload"].get("payload").is_none());
}

#[tokio::test]
async fn test_bad_json_gets_error_frame_and_connection_survives() {
    let server = start_test_server().await;
    let (mut ws, _) = connect_ws(&server.addr, "sess-1", "alice").await;

    ws.send(Message::Text("just plain text".into())).await.unwrap();
    let err = next_frame(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["payload"]["code"], "invalid_json");

    send_json(&mut ws, serde_json::json!({ "type": "ping" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "heartbeat");
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let gateway = GatewayConfig {
        max_message_size: 1024,
        ..GatewayConfig::default()
    };
    let server = start_server(HashMap::new(), 0, gateway).await;
    let (mut ws, _) = connect_ws(&server.addr, "sess-1", "alice").await;

    let big = "x".repeat(4096);
    let _ = ws.send(Message::Text(chat(&big).to_string().into())).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn test_session_fan_out_and_isolation() {
    let server = start_test_server().await;
    let (mut phone, _) = connect_ws(&server.addr, "shared", "alice").await;
    let (mut laptop, _) = connect_ws(&server.addr, "shared", "alice").await;
    let (mut stranger, _) = connect_ws(&server.addr, "elsewhere", "bob").await;

    send_json(&mut phone, chat("hello there")).await;

    let on_phone = read_response(&mut phone).await;
    let on_laptop = read_response(&mut laptop).await;
    assert_eq!(contents(&on_phone), contents(&on_laptop));

    let nothing = tokio::time::timeout(Duration::from_millis(200), stranger.next()).await;
    assert!(nothing.is_err(), "other session received a frame");
}

#[tokio::test]
async fn test_cancel_over_websocket() {
    let server = start_server(HashMap::new(), 25, GatewayConfig::default()).await;
    let (mut ws, _) = connect_ws(&server.addr, "sess-1", "alice").await;

    send_json(
        &mut ws,
        chat("why does the borrow checker reject two mutable references"),
    )
    .await;
    let first = next_frame(&mut ws).await;
    let task_id = fragment(&first)["task_id"].as_str().unwrap().to_string();

    send_json(
        &mut ws,
        serde_json::json!({ "type": "cancel", "payload": { "task_id": task_id } }),
    )
    .await;

    let frames = read_response(&mut ws).await;
    let last = frames.last().unwrap();
    assert_eq!(fragment(last)["status"], "cancelled");
    assert_eq!(frames.iter().filter(|f| f["payload"]["is_final"] == true).count(), 1);
}

#[tokio::test]
async fn test_one_shot_chat_endpoint() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/chat", server.addr))
        .json(&serde_json::json!({
            "session_id": "rest-1",
            "user_id": "alice",
            "content": "write a function to reverse a string",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let message: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(message["is_final"], true);
    assert_eq!(message["status"], "completed");
    assert_eq!(message["agent_type"], "writer");
    assert!(message["content"].as_str().unwrap().contains("reverse_string"));

    let resp = client
        .post(format!("http://{}/api/chat", server.addr))
        .json(&serde_json::json!({ "session_id": "rest-1", "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("http://{}/api/chat", server.addr))
        .json(&serde_json::json!({ "session_id": "rest-1", "user_id": "alice", "content": " " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "transport_error");
}

#[tokio::test]
async fn test_cancel_endpoint_unknown_task() {
    let server = start_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!(
            "http://{}/api/tasks/{}/cancel?session_id=s&user_id=alice",
            server.addr,
            uuid::Uuid::new_v4()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "task_not_found");
}

#[tokio::test]
async fn test_silent_client_is_disconnected() {
    let gateway = GatewayConfig {
        pong_wait_ms: 200,
        ..GatewayConfig::default()
    };
    let server = start_server(HashMap::new(), 0, gateway).await;
    let (_ws, _) = connect_ws(&server.addr, "sess-1", "alice").await;

    // Not reading means pings go unanswered and nothing arrives inbound.
    tokio::time::sleep(Duration::from_millis(800)).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["connections"], 0);
}
