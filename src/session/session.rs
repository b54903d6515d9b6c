use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::CallConfig;
use super::status::{CallMonitor, CallState, CallStatus};
use crate::audio::{
    AudioMode, AudioSettingsHandle, Permission, SharedCaptureDevice, SharedPlaybackDevice,
};
use crate::error::{CallError, CallResult};
use crate::playback::PlaybackRouter;
use crate::recording::RecordingLoop;
use crate::transport::{ConnectionManager, Connector};

/// Tasks belonging to the call in progress
struct RunningCall {
    call_id: Uuid,
    recording: JoinHandle<()>,
    transport: JoinHandle<()>,
    playback: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

struct SessionInner {
    config: CallConfig,
    microphone: SharedCaptureDevice,
    speaker: SharedPlaybackDevice,
    connector: Arc<dyn Connector>,
    settings: AudioSettingsHandle,
    monitor: CallMonitor,
    /// Held across every start/stop so transitions never interleave
    running: Mutex<Option<RunningCall>>,
}

/// A duplex audio call: microphone to endpoint, endpoint to speaker
///
/// Cloning is cheap and every clone controls the same call.
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<SessionInner>,
}

impl CallSession {
    pub fn new(
        config: CallConfig,
        microphone: SharedCaptureDevice,
        speaker: SharedPlaybackDevice,
        connector: Arc<dyn Connector>,
        settings: AudioSettingsHandle,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                microphone,
                speaker,
                connector,
                settings,
                monitor: CallMonitor::new(),
                running: Mutex::new(None),
            }),
        }
    }

    /// Start a call
    ///
    /// Returns once the microphone is configured and all call tasks are
    /// running; the connection itself opens in the background.
    pub async fn start(&self) -> CallResult<Uuid> {
        let inner = &self.inner;
        let mut running = inner.running.lock().await;

        if running.is_some() || inner.monitor.state() != CallState::Idle {
            warn!("Call already active");
            return Err(CallError::AlreadyActive);
        }

        let Ok(mut microphone) = Arc::clone(&inner.microphone).try_lock_owned() else {
            warn!("Microphone is in use by another call");
            return Err(CallError::AlreadyActive);
        };
        let Ok(speaker) = Arc::clone(&inner.speaker).try_lock_owned() else {
            warn!("Speaker is in use by another call");
            return Err(CallError::AlreadyActive);
        };

        let call_id = Uuid::new_v4();
        info!("Starting call {} to {}", call_id, inner.config.endpoint);
        inner.monitor.begin(call_id);

        let startup = match microphone.request_permission().await {
            Ok(Permission::Granted) => microphone
                .configure(&inner.config.format(), &AudioMode::duplex())
                .await
                .map_err(CallError::device),
            Ok(Permission::Denied) => Err(CallError::PermissionDenied),
            Err(e) => Err(CallError::device(e)),
        };

        if let Err(e) = startup {
            error!("Failed to start call: {}", e);
            if let Err(release_err) = microphone.release().await {
                warn!("Failed to release {}: {:#}", microphone.name(), release_err);
            }
            inner.monitor.fail(e.to_string());
            return Err(e);
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let router = PlaybackRouter::new(
            speaker,
            inner.settings.clone(),
            inbound_rx,
            fatal_tx.clone(),
            inner.monitor.clone(),
            inner.config.max_playback_failures,
        );
        let playback = tokio::spawn(router.run());

        let (manager, transport_handle) = ConnectionManager::new(
            inner.config.transport(),
            Arc::clone(&inner.connector),
            inbound_tx,
            fatal_tx.clone(),
            inner.monitor.clone(),
        );
        let transport = tokio::spawn(manager.run());

        let recorder = RecordingLoop::new(
            microphone,
            inner.config.recording(),
            inner.settings.clone(),
            transport_handle,
            inner.monitor.clone(),
        );
        let recording = tokio::spawn(async move {
            if let Err(e) = recorder.run().await {
                let _ = fatal_tx.send(e);
            }
        });

        let supervisor = tokio::spawn(supervise(Arc::downgrade(&self.inner), call_id, fatal_rx));

        *running = Some(RunningCall {
            call_id,
            recording,
            transport,
            playback,
            supervisor,
        });
        inner.monitor.set_state(CallState::Active);

        info!("Call {} active", call_id);
        Ok(call_id)
    }

    /// Stop the call and wait for its tasks to finish
    ///
    /// Does nothing when no call is running. Returns the final status.
    pub async fn stop(&self) -> CallStatus {
        let mut running = self.inner.running.lock().await;

        let Some(call) = running.take() else {
            return self.inner.monitor.snapshot();
        };

        info!("Stopping call {}", call.call_id);
        call.supervisor.abort();
        self.inner.teardown(call).await;
        self.inner.monitor.finish();

        info!("Call stopped");
        self.inner.monitor.snapshot()
    }

    /// Watch every status change
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<CallStatus> {
        self.inner.monitor.subscribe()
    }

    pub fn status(&self) -> CallStatus {
        self.inner.monitor.snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.inner.monitor.state() == CallState::Active
    }

    pub fn monitor(&self) -> &CallMonitor {
        &self.inner.monitor
    }

    pub fn settings(&self) -> &AudioSettingsHandle {
        &self.inner.settings
    }

    pub fn config(&self) -> &CallConfig {
        &self.inner.config
    }
}

impl SessionInner {
    /// Signal Stopping and join the call tasks; the caller sets the final state
    async fn teardown(&self, call: RunningCall) {
        self.monitor.set_state(CallState::Stopping);

        if let Err(e) = call.recording.await {
            error!("Recording task panicked: {}", e);
        }
        if let Err(e) = call.transport.await {
            error!("Transport task panicked: {}", e);
        }
        if let Err(e) = call.playback.await {
            error!("Playback task panicked: {}", e);
        }
    }

    /// End the call `call_id` after an unrecoverable error
    async fn fail_call(&self, call_id: Uuid, err: CallError) {
        let mut running = self.running.lock().await;

        match running.as_ref() {
            Some(call) if call.call_id == call_id => {}
            _ => {
                info!("Ignoring failure reported by finished call {}: {}", call_id, err);
                return;
            }
        }

        let Some(call) = running.take() else {
            return;
        };

        error!("Call {} failed: {}", call_id, err);
        self.teardown(call).await;
        self.monitor.fail(err.to_string());
    }
}

/// Waits for the first fatal error of a call and tears the call down
async fn supervise(
    session: Weak<SessionInner>,
    call_id: Uuid,
    mut fatal_rx: mpsc::UnboundedReceiver<CallError>,
) {
    let Some(err) = fatal_rx.recv().await else {
        return;
    };

    if let Some(inner) = session.upgrade() {
        inner.fail_call(call_id, err).await;
    }
}
