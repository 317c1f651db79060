use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and streaming settings (`[gateway]` in `neuron.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Largest inbound frame accepted, in bytes. Bigger frames close the connection.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    /// How long a connection may stay silent before it is dropped.
    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,
    /// Deadline for writing one frame to the socket.
    #[serde(default = "default_write_wait_ms")]
    pub write_wait_ms: u64,
    /// Idle time after which a running task emits a heartbeat frame.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_max_message_size() -> usize {
    512 * 1024
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_pong_wait_ms() -> u64 {
    60_000
}

fn default_write_wait_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            send_queue_capacity: default_send_queue_capacity(),
            pong_wait_ms: default_pong_wait_ms(),
            write_wait_ms: default_write_wait_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl GatewayConfig {
    /// How long a connection may stay silent before it is closed.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Keepalive probe period: nine tenths of the pong wait, so a probe is
    /// always answered before the reader gives up.
    pub fn ping_period(&self) -> Duration {
        Duration::from_millis((self.pong_wait_ms * 9 / 10).max(1))
    }

    /// Deadline for a single socket write.
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    /// Bridge heartbeat interval. Zero disables heartbeats.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}
