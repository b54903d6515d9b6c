use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::AudioFormat;
use crate::recording::RecordingConfig;
use crate::transport::{OverflowPolicy, PayloadEncoding, ReconnectPolicy, TransportConfig};

/// Configuration for a call session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// WebSocket endpoint (ws:// or wss://)
    pub endpoint: String,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Number of capture channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration of each captured segment
    /// Default: 1000 ms
    pub segment_ms: u64,

    /// Pause before retrying a failed segment capture
    pub capture_retry_delay_ms: u64,

    /// Failed capture attempts per segment before the call is ended
    pub max_capture_attempts: u32,

    pub reconnect: ReconnectPolicy,

    /// Maximum segments held while the connection is down
    pub buffer_capacity: usize,

    pub overflow: OverflowPolicy,

    /// Outbound framing: binary WAV frames or base64 JSON
    pub encoding: PayloadEncoding,

    /// Consecutive speaker failures before the call is ended
    pub max_playback_failures: u32,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8765".to_string(),
            sample_rate: 44100,
            channels: 1,
            segment_ms: 1000,
            capture_retry_delay_ms: 1000,
            max_capture_attempts: 3,
            reconnect: ReconnectPolicy::default(),
            buffer_capacity: 120, // two minutes of 1s segments
            overflow: OverflowPolicy::DropOldest,
            encoding: PayloadEncoding::Binary,
            max_playback_failures: 3,
        }
    }
}

impl CallConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::pcm16(self.sample_rate, self.channels)
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_millis(self.segment_ms)
    }

    pub fn recording(&self) -> RecordingConfig {
        RecordingConfig {
            segment_duration: self.segment_duration(),
            retry_delay: Duration::from_millis(self.capture_retry_delay_ms),
            max_attempts: self.max_capture_attempts.max(1),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.endpoint.clone(),
            encoding: self.encoding,
            reconnect: self.reconnect.clone(),
            buffer_capacity: self.buffer_capacity,
            overflow: self.overflow,
        }
    }
}
