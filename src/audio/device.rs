use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

/// Sample encoding of captured and decoded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// 16-bit signed PCM, little-endian, interleaved
    Pcm16,
}

/// Audio format descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl AudioFormat {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            encoding: SampleEncoding::Pcm16,
        }
    }

    /// Number of interleaved samples covering `duration`
    pub fn samples_for(&self, duration: Duration) -> usize {
        let per_second = self.sample_rate as u128 * self.channels as u128;
        (per_second * duration.as_millis() / 1000) as usize
    }

    /// Playback time of `sample_count` interleaved samples
    pub fn duration_of(&self, sample_count: usize) -> Duration {
        let per_second = self.sample_rate as f64 * self.channels.max(1) as f64;
        if per_second == 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(sample_count as f64 / per_second)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16(44100, 1)
    }
}

/// One fixed-duration chunk of captured audio
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    pub format: AudioFormat,
    /// When capture of this segment completed
    pub captured_at: DateTime<Utc>,
}

impl AudioSegment {
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.samples.len())
    }
}

/// Decoded audio ready for playback
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub format: AudioFormat,
}

impl AudioClip {
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.samples.len())
    }
}

/// Result of a microphone permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Audio session mode applied before a call starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioMode {
    pub allows_recording: bool,
    pub plays_in_silent_mode: bool,
    /// Lower other apps' volume while the call plays audio
    pub duck_others: bool,
    pub play_through_earpiece: bool,
}

impl AudioMode {
    /// Simultaneous record and playback through the loudspeaker
    pub fn duplex() -> Self {
        Self {
            allows_recording: true,
            plays_in_silent_mode: true,
            duck_others: true,
            play_through_earpiece: false,
        }
    }
}

/// Microphone abstraction
///
/// Implementations:
/// - File: replay a WAV file in real time (`FileCaptureDevice`)
/// - Tests: in-memory doubles
#[async_trait::async_trait]
pub trait AudioCaptureDevice: Send {
    /// Ask the platform for microphone access
    async fn request_permission(&mut self) -> Result<Permission>;

    /// Prepare the hardware for capture in `format` under `mode`
    async fn configure(&mut self, format: &AudioFormat, mode: &AudioMode) -> Result<()>;

    /// Capture one segment of `duration`
    ///
    /// Dropping the returned future abandons the segment.
    async fn capture_segment(&mut self, duration: Duration) -> Result<AudioSegment>;

    /// Release the hardware
    async fn release(&mut self) -> Result<()>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Speaker abstraction
#[async_trait::async_trait]
pub trait AudioPlaybackDevice: Send {
    /// Start playing `clip`
    async fn play(&mut self, clip: AudioClip) -> Result<PlaybackHandle>;

    /// Stop a clip before it finishes and release its resources
    async fn stop(&mut self, handle: PlaybackHandle) -> Result<()>;

    /// Release the resources of a clip that finished on its own
    async fn release(&mut self, handle: PlaybackHandle) -> Result<()>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// A clip in flight on a playback device
#[derive(Debug)]
pub struct PlaybackHandle {
    id: u64,
    done: oneshot::Receiver<()>,
    completed: bool,
}

impl PlaybackHandle {
    /// `done` fires (or is dropped) when the device stops producing the clip
    pub fn new(id: u64, done: oneshot::Receiver<()>) -> Self {
        Self {
            id,
            done,
            completed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once the clip has finished playing
    pub async fn finished(&mut self) {
        if self.completed {
            return;
        }
        let _ = (&mut self.done).await;
        self.completed = true;
    }
}

/// Microphone shared between sessions; a running call holds the lock
pub type SharedCaptureDevice = Arc<Mutex<Box<dyn AudioCaptureDevice>>>;

/// Speaker shared between sessions; a running call holds the lock
pub type SharedPlaybackDevice = Arc<Mutex<Box<dyn AudioPlaybackDevice>>>;

pub fn share_capture(device: impl AudioCaptureDevice + 'static) -> SharedCaptureDevice {
    Arc::new(Mutex::new(Box::new(device)))
}

pub fn share_playback(device: impl AudioPlaybackDevice + 'static) -> SharedPlaybackDevice {
    Arc::new(Mutex::new(Box::new(device)))
}
