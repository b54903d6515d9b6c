use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Lifecycle of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Starting,
    Active,
    Stopping,
}

impl CallState {
    /// Starting or Active: the call intends to keep running
    pub fn is_live(self) -> bool {
        matches!(self, CallState::Starting | CallState::Active)
    }
}

/// Transport connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Observable snapshot of the call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStatus {
    /// Identifier of the current (or last) call
    pub call_id: Option<Uuid>,

    pub state: CallState,

    pub connection: ConnectionState,

    /// When the current call started
    pub started_at: Option<DateTime<Utc>>,

    /// Last successful outbound send
    pub last_sent: Option<DateTime<Utc>>,

    /// Last inbound audio payload
    pub last_received: Option<DateTime<Utc>>,

    /// Most recent failure surfaced to the user
    pub last_error: Option<String>,

    /// Most recent transcription reported by the endpoint
    pub last_transcription: Option<String>,

    pub segments_captured: u64,
    pub segments_sent: u64,
    /// Segments currently waiting in the outbound buffer
    pub segments_buffered: usize,
    /// Segments discarded by the overflow policy
    pub segments_dropped: u64,
    pub clips_played: u64,
    pub reconnect_attempts: u64,
}

impl Default for CallStatus {
    fn default() -> Self {
        Self {
            call_id: None,
            state: CallState::Idle,
            connection: ConnectionState::Closed,
            started_at: None,
            last_sent: None,
            last_received: None,
            last_error: None,
            last_transcription: None,
            segments_captured: 0,
            segments_sent: 0,
            segments_buffered: 0,
            segments_dropped: 0,
            clips_played: 0,
            reconnect_attempts: 0,
        }
    }
}

impl CallStatus {
    pub fn is_active(&self) -> bool {
        self.state == CallState::Active
    }
}

/// Single source of truth for call state
///
/// Every task of a call holds a clone and consults it instead of keeping its
/// own flags. Observers subscribe to receive each change.
#[derive(Clone)]
pub struct CallMonitor {
    tx: Arc<watch::Sender<CallStatus>>,
}

impl CallMonitor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CallStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<CallStatus> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> CallStatus {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> CallState {
        self.tx.borrow().state
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    pub fn call_id(&self) -> Option<Uuid> {
        self.tx.borrow().call_id
    }

    /// Enter Starting for a new call; per-call fields are reset, the last error is kept
    pub(crate) fn begin(&self, call_id: Uuid) {
        self.tx.send_modify(|s| {
            let last_error = s.last_error.take();
            *s = CallStatus {
                call_id: Some(call_id),
                state: CallState::Starting,
                started_at: Some(Utc::now()),
                last_error,
                ..CallStatus::default()
            };
        });
    }

    pub(crate) fn set_state(&self, state: CallState) {
        self.tx.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            s.state = state;
            true
        });
    }

    /// Back to Idle with the connection closed and nothing buffered
    pub(crate) fn finish(&self) {
        self.tx.send_modify(|s| {
            s.state = CallState::Idle;
            s.connection = ConnectionState::Closed;
            s.segments_buffered = 0;
        });
    }

    /// Record a failure that ends (or prevents) a call, and go Idle
    pub(crate) fn fail(&self, message: String) {
        self.tx.send_modify(|s| {
            s.state = CallState::Idle;
            s.connection = ConnectionState::Closed;
            s.segments_buffered = 0;
            s.last_error = Some(message);
        });
    }

    pub(crate) fn set_connection(&self, connection: ConnectionState) {
        self.tx.send_if_modified(|s| {
            if s.connection == connection {
                return false;
            }
            s.connection = connection;
            true
        });
    }

    pub(crate) fn record_captured(&self) {
        self.tx.send_modify(|s| s.segments_captured += 1);
    }

    pub(crate) fn record_sent(&self, buffered: usize) {
        self.tx.send_modify(|s| {
            s.segments_sent += 1;
            s.segments_buffered = buffered;
            s.last_sent = Some(Utc::now());
        });
    }

    pub(crate) fn set_buffered(&self, buffered: usize) {
        self.tx.send_if_modified(|s| {
            if s.segments_buffered == buffered {
                return false;
            }
            s.segments_buffered = buffered;
            true
        });
    }

    pub(crate) fn record_dropped(&self, dropped: usize) {
        self.tx.send_modify(|s| s.segments_dropped += dropped as u64);
    }

    pub(crate) fn record_received(&self) {
        self.tx.send_modify(|s| s.last_received = Some(Utc::now()));
    }

    pub(crate) fn record_transcription(&self, text: String) {
        self.tx.send_modify(|s| s.last_transcription = Some(text));
    }

    pub(crate) fn record_reconnect(&self) {
        self.tx.send_modify(|s| s.reconnect_attempts += 1);
    }

    pub(crate) fn record_clip_played(&self) {
        self.tx.send_modify(|s| s.clips_played += 1);
    }
}

impl Default for CallMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the call is no longer live
pub async fn stopped(rx: &mut watch::Receiver<CallStatus>) {
    // The sender lives as long as any monitor clone; an error means it is gone
    let _ = rx.wait_for(|s| !s.state.is_live()).await;
}
