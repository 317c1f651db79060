//! Core types and error definitions for the Neuron streaming gateway.
//!
//! This crate provides the foundational types shared across all Neuron crates:
//! the unified error enum, the conversational [`Message`] (which doubles as the
//! streamed response fragment), and the inbound [`ChatRequest`].
//!
//! # Main types
//!
//! - [`NeuronError`] — Unified error enum for all Neuron subsystems.
//! - [`NeuronResult`] — Convenience alias for `Result<T, NeuronError>`.
//! - [`Message`] — A message or response fragment within a session.
//! - [`AgentType`] — The specialized agent that produced a fragment.
//! - [`TaskStatus`] — Lifecycle state of one orchestration run.
//! - [`ChatRequest`] — A user message entering the pipeline.

/// Error types.
pub mod error;
/// Message, fragment and enum types shared across the pipeline.
pub mod message;
/// Inbound chat request.
pub mod request;

pub use error::{NeuronError, NeuronResult};
pub use message::{AgentType, ErrorInfo, Message, MessageType, TaskStatus, ToolCall};
pub use request::ChatRequest;
