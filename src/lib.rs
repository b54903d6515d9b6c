pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod recording;
pub mod session;
pub mod transport;

pub use audio::{
    AudioCaptureDevice, AudioClip, AudioFile, AudioFormat, AudioPlaybackDevice, AudioSegment,
    AudioSettings, AudioSettingsHandle, FileCaptureDevice, PlaybackHandle,
};
pub use config::Config;
pub use error::{CallError, CallResult};
pub use http::{create_router, AppState};
pub use playback::{FilePlaybackDevice, PlaybackRouter};
pub use recording::{RecordingConfig, RecordingLoop};
pub use session::{CallConfig, CallMonitor, CallSession, CallState, CallStatus, ConnectionState};
pub use transport::{
    Connector, InboundMessage, OutboundBuffer, OverflowPolicy, PayloadEncoding, ReconnectPolicy,
    WebSocketConnector,
};
