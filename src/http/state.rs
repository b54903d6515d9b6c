use crate::audio::AudioSettingsHandle;
use crate::session::CallSession;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The call controlled by this server
    pub session: CallSession,

    /// Volume settings, shared with the session
    pub settings: AudioSettingsHandle,
}

impl AppState {
    pub fn new(session: CallSession) -> Self {
        let settings = session.settings().clone();
        Self { session, settings }
    }
}
