//! Call session management
//!
//! This module provides the `CallSession` abstraction that manages:
//! - Microphone acquisition and release
//! - The segmented recording loop
//! - The transport connection with reconnection and outbound buffering
//! - Playback of inbound audio
//! - Call state published through `CallMonitor`

mod config;
mod session;
mod status;

pub use config::CallConfig;
pub use session::CallSession;
pub use status::{stopped, CallMonitor, CallState, CallStatus, ConnectionState};
