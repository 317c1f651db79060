use crate::config::GatewayConfig;
use crate::hub::{ClientConnection, ConnectionHub};
use crate::protocol::ServerFrame;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Drives one upgraded WebSocket until either side gives up.
///
/// The connection is registered with the hub, then served by two loops: the
/// read loop on this task and the write loop on its own task. Whichever ends
/// first closes the connection and the other follows.
pub async fn serve_connection(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    user_id: String,
    session_id: String,
) {
    let (conn, outbound) = match hub.register(&user_id, &session_id) {
        Ok(registered) => registered,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Rejecting connection");
            return;
        }
    };

    let (sink, stream) = socket.split();
    let config = hub.config().clone();

    let writer = tokio::spawn(write_loop(sink, outbound, Arc::clone(&conn), config.clone()));
    read_loop(stream, &hub, &conn, &config).await;

    hub.unregister(&conn);
    if let Err(e) = writer.await {
        warn!(connection_id = %conn.id, error = %e, "Write loop panicked");
    }
    info!(connection_id = %conn.id, session_id = %session_id, "WebSocket disconnected");
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    hub: &Arc<ConnectionHub>,
    conn: &Arc<ClientConnection>,
    config: &GatewayConfig,
) {
    loop {
        let next = tokio::select! {
            _ = conn.closed() => break,
            next = tokio::time::timeout(config.pong_wait(), stream.next()) => next,
        };

        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                debug!(connection_id = %conn.id, error = %e, "Read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(connection_id = %conn.id, idle = ?conn.idle_for(), "Read deadline exceeded");
                break;
            }
        };
        conn.touch();

        match message {
            WsMessage::Text(text) => {
                if oversized(conn, text.len(), config) {
                    break;
                }
                hub.handle_inbound(conn, text.as_str());
            }
            WsMessage::Binary(bytes) => {
                if oversized(conn, bytes.len(), config) {
                    break;
                }
                match std::str::from_utf8(&bytes) {
                    Ok(text) => hub.handle_inbound(conn, text),
                    Err(_) => {
                        hub.send_to(
                            conn,
                            &ServerFrame::error("invalid_frame", "binary frames must carry UTF-8 JSON"),
                        );
                    }
                }
            }
            WsMessage::Pong(_) => conn.mark_pong(),
            WsMessage::Ping(_) => {}
            WsMessage::Close(_) => break,
        }
    }
}

fn oversized(conn: &ClientConnection, len: usize, config: &GatewayConfig) -> bool {
    if len > config.max_message_size {
        warn!(
            connection_id = %conn.id,
            size = len,
            max = config.max_message_size,
            "Frame too large, closing connection"
        );
        return true;
    }
    false
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    conn: Arc<ClientConnection>,
    config: GatewayConfig,
) {
    let write_wait = config.write_wait();
    let mut ping = tokio::time::interval(config.ping_period());
    ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    let message = WsMessage::Text(String::from(&*text).into());
                    if !write(&mut sink, message, write_wait, &conn).await {
                        break;
                    }
                }
                None => {
                    write(&mut sink, WsMessage::Close(None), write_wait, &conn).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if conn.mark_ping_sent() {
                    warn!(connection_id = %conn.id, idle = ?conn.idle_for(), "Keepalive not acknowledged");
                    break;
                }
                if !write(&mut sink, WsMessage::Ping(Vec::new().into()), write_wait, &conn).await {
                    break;
                }
            }
        }
    }

    conn.close();
}

async fn write(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    message: WsMessage,
    write_wait: Duration,
    conn: &ClientConnection,
) -> bool {
    match tokio::time::timeout(write_wait, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(connection_id = %conn.id, error = %e, "Write error");
            false
        }
        Err(_) => {
            warn!(connection_id = %conn.id, "Write deadline exceeded");
            false
        }
    }
}
