use thiserror::Error;

/// Failures surfaced by a call
///
/// Device traits report `anyhow` errors; they are folded into `Device` at the
/// session boundary so the caller sees one taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// `start()` while a call is running, or the microphone/speaker is held elsewhere
    #[error("a call is already active")]
    AlreadyActive,

    /// Microphone permission was refused
    #[error("microphone permission not granted")]
    PermissionDenied,

    /// Capture or playback hardware failure
    #[error("audio device error: {0}")]
    Device(String),

    /// Connection dropped, refused or failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed inbound or outbound payload
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Outbound buffer exceeded its bound; entries were dropped
    #[error("outbound buffer overflow: dropped {dropped} segment(s)")]
    BufferOverflow { dropped: usize },
}

pub type CallResult<T> = std::result::Result<T, CallError>;

impl CallError {
    pub fn device(err: anyhow::Error) -> Self {
        CallError::Device(format!("{:#}", err))
    }
}
