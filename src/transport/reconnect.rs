use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decides whether and when to re-establish the transport after a disconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// When false, the first transport failure ends the call
    pub enabled: bool,

    /// Fixed delay before each reconnect attempt
    pub delay_ms: u64,

    /// Consecutive failed connections tolerated before giving up (None = forever)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 5000,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Delay before the next attempt after `failures` consecutive failures,
    /// or None when no further attempt should be made
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        match self.max_attempts {
            Some(max) if failures > max => None,
            _ => Some(self.delay()),
        }
    }
}
