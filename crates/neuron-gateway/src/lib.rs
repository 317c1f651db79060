//! WebSocket and HTTP gateway for the Neuron orchestrator.
//!
//! Clients connect to `/ws` with a session id and a credential. The
//! [`ConnectionHub`] keeps every live connection grouped by session and fans
//! each task's fragments out to all connections of the originating session.
//! The [`StreamingBridge`] sits between transports and the orchestrator.
//!
//! # Main types
//!
//! - [`GatewayServer`] — Builds the axum router.
//! - [`ConnectionHub`] — Live connections, delivery and backpressure.
//! - [`StreamingBridge`] — Request/stream adapter over the orchestrator.
//! - [`Authenticator`] — Credential to user id mapping.

/// Transport-agnostic adapter over the orchestrator.
pub mod bridge;
/// `[gateway]` settings.
pub mod config;
/// Per-connection read and write loops.
pub mod connection;
/// Connection registry and delivery.
pub mod hub;
/// Authentication and HTTP error helpers.
pub mod middleware;
/// Wire frames.
pub mod protocol;
/// Router and HTTP handlers.
pub mod server;

pub use bridge::{SessionHandle, StreamingBridge};
pub use config::GatewayConfig;
pub use hub::{ClientConnection, ConnectionHub, DeliveryReport, SendOutcome};
pub use middleware::{ApiKeyAuthenticator, Authenticator};
pub use protocol::{ClientFrame, RequestPayload, ResponsePayload, ServerFrame, StreamRequest, StreamResponse};
pub use server::{AppState, GatewayServer};
