//! Server metrics for observability
//!
//! Provides runtime counters for monitoring the bridge.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently connected clients
    pub active_clients: AtomicU64,
    /// Total clients since server start
    pub total_clients: AtomicU64,
    /// Clients evicted for backpressure or dead connections
    pub clients_evicted: AtomicU64,

    // Traffic metrics
    /// Output chunks pumped from the session
    pub chunks_broadcast: AtomicU64,
    /// Output bytes pumped from the session
    pub bytes_broadcast: AtomicU64,
    /// Input messages written into the session
    pub input_messages: AtomicU64,
    /// Resize control messages applied
    pub resize_messages: AtomicU64,

    // Error metrics
    /// PTY-side read/write/resize errors
    pub pty_errors: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn client_connected(&self) {
        self.active_clients.fetch_add(1, Ordering::Relaxed);
        self.total_clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        self.active_clients.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn client_evicted(&self) {
        self.clients_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_broadcast(&self, bytes: usize) {
        self.chunks_broadcast.fetch_add(1, Ordering::Relaxed);
        self.bytes_broadcast.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn input_message(&self) {
        self.input_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resize_message(&self) {
        self.resize_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pty_error(&self) {
        self.pty_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            clients: ClientMetrics {
                active: self.active_clients.load(Ordering::Relaxed),
                total: self.total_clients.load(Ordering::Relaxed),
                evicted: self.clients_evicted.load(Ordering::Relaxed),
            },
            traffic: TrafficMetrics {
                chunks_broadcast: self.chunks_broadcast.load(Ordering::Relaxed),
                bytes_broadcast: self.bytes_broadcast.load(Ordering::Relaxed),
                input_messages: self.input_messages.load(Ordering::Relaxed),
                resize_messages: self.resize_messages.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                pty: self.pty_errors.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub clients: ClientMetrics,
    pub traffic: TrafficMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetrics {
    pub active: u64,
    pub total: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficMetrics {
    pub chunks_broadcast: u64,
    pub bytes_broadcast: u64,
    pub input_messages: u64,
    pub resize_messages: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub pty: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub session: SessionHealth,
    pub clients: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHealth {
    pub running: bool,
    pub pid: Option<u32>,
    pub cols: u16,
    pub rows: u16,
}
