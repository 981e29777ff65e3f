//! Connection tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a room connection.
///
/// The defaults suit an interactive game on a reasonable network. Tests
/// usually shrink the intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Consecutive failed attempts tolerated before the session is failed.
    /// The count resets whenever a handshake completes.
    pub max_reconnect: u32,

    /// Pause between a failure and the next dial.
    pub retry_interval: Duration,

    /// Upper bound on dialing plus waiting for the server's ready event.
    pub handshake_timeout: Duration,

    /// Number of sent messages kept for resending after a reconnect.
    pub pool_capacity: usize,

    /// Received events that may be waiting for the application at once.
    /// The receiver stops reading from the socket while all are in use.
    pub event_buffers: usize,

    /// Client deadline in seconds used until the room announces one.
    pub default_client_deadline: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect: 5,
            retry_interval: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
            pool_capacity: 512,
            event_buffers: 256,
            default_client_deadline: 30,
        }
    }
}

impl SessionConfig {
    /// Heartbeat period for a client deadline of `deadline_secs`: a third of
    /// the deadline, never below 100ms.
    pub fn ping_interval(&self, deadline_secs: u32) -> Duration {
        let secs = if deadline_secs == 0 {
            self.default_client_deadline
        } else {
            deadline_secs
        };
        (Duration::from_secs(u64::from(secs)) / 3).max(Duration::from_millis(100))
    }
}
