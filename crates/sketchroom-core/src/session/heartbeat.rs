//! Heartbeat liveness tracking
//!
//! The monitor holds no timers itself. The driver ticks it every
//! `interval` while the connection is open; each tick either asks for a
//! probe or reports that the connection has been silent too long.

use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatCheck {
    /// Still alive, send a PING
    Probe,
    /// No liveness response within the deadline
    Expired { silent_for: Duration },
}

/// Tracks the last liveness response for the open connection
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    /// `None` while inert
    last_liveness: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_liveness: None,
        }
    }

    /// Arm the monitor for a freshly opened connection
    pub fn start(&mut self, now: Instant) {
        self.last_liveness = Some(now);
    }

    /// Disarm the monitor
    pub fn stop(&mut self) {
        self.last_liveness = None;
    }

    pub fn is_running(&self) -> bool {
        self.last_liveness.is_some()
    }

    /// Record a PONG. Ignored while inert.
    pub fn record_liveness(&mut self, now: Instant) {
        if let Some(last) = self.last_liveness.as_mut() {
            *last = now;
        }
    }

    /// Evaluate a tick. Returns `None` while inert.
    pub fn check(&self, now: Instant) -> Option<HeartbeatCheck> {
        let last = self.last_liveness?;
        let silent_for = now.saturating_duration_since(last);
        if silent_for > self.timeout {
            Some(HeartbeatCheck::Expired { silent_for })
        } else {
            Some(HeartbeatCheck::Probe)
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(60))
    }
}
