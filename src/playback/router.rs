use tokio::sync::{mpsc, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::audio::{apply_gain, decode_clip, AudioPlaybackDevice, AudioSettingsHandle, PlaybackHandle};
use crate::error::CallError;
use crate::session::{stopped, CallMonitor};
use crate::transport::{AudioPayload, InboundMessage};

/// Plays inbound audio, most recent message wins
///
/// A new payload stops and releases whatever is playing before the new clip
/// starts, so there is never a playback queue. A speaker that keeps failing
/// ends the call through `fatal_tx`.
pub struct PlaybackRouter {
    speaker: OwnedMutexGuard<Box<dyn AudioPlaybackDevice>>,
    settings: AudioSettingsHandle,
    inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
    fatal_tx: mpsc::UnboundedSender<CallError>,
    monitor: CallMonitor,
    max_failures: u32,
    failures: u32,
}

impl PlaybackRouter {
    pub fn new(
        speaker: OwnedMutexGuard<Box<dyn AudioPlaybackDevice>>,
        settings: AudioSettingsHandle,
        inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
        fatal_tx: mpsc::UnboundedSender<CallError>,
        monitor: CallMonitor,
        max_failures: u32,
    ) -> Self {
        Self {
            speaker,
            settings,
            inbound_rx,
            fatal_tx,
            monitor,
            max_failures: max_failures.max(1),
            failures: 0,
        }
    }

    pub async fn run(mut self) {
        info!("Playback router started ({})", self.speaker.name());

        let mut state_rx = self.monitor.subscribe();
        let mut current: Option<PlaybackHandle> = None;

        loop {
            tokio::select! {
                message = self.inbound_rx.recv() => match message {
                    Some(InboundMessage::AudioPayload(payload)) => {
                        self.supersede(&mut current).await;
                        match self.play(payload).await {
                            Ok(handle) => current = handle,
                            Err(e) => {
                                error!("{}", e);
                                let _ = self.fatal_tx.send(e);
                                break;
                            }
                        }
                    }
                    Some(InboundMessage::ControlMessage { kind, .. }) => {
                        debug!("Playback ignores control message: {}", kind);
                    }
                    Some(InboundMessage::Unrecognized(_)) => {}
                    None => break,
                },
                _ = clip_finished(&mut current) => {
                    if let Some(handle) = current.take() {
                        let id = handle.id();
                        if let Err(e) = self.speaker.release(handle).await {
                            warn!("Failed to release clip {}: {:#}", id, e);
                        }
                        self.monitor.record_clip_played();
                        debug!("Clip {} finished", id);
                    }
                }
                _ = stopped(&mut state_rx) => break,
            }
        }

        self.supersede(&mut current).await;
        info!("Playback router stopped");
    }

    /// Stop and release the current clip, if any
    async fn supersede(&mut self, current: &mut Option<PlaybackHandle>) {
        if let Some(handle) = current.take() {
            let id = handle.id();
            debug!("Stopping clip {}", id);
            if let Err(e) = self.speaker.stop(handle).await {
                warn!("Failed to stop clip {}: {:#}", id, e);
            }
        }
    }

    /// Decode and start one clip
    ///
    /// Undecodable payloads are skipped. Speaker failures are tolerated until
    /// `max_failures` happen in a row.
    async fn play(&mut self, payload: AudioPayload) -> Result<Option<PlaybackHandle>, CallError> {
        let mut clip = match decode_clip(&payload.bytes, payload.container) {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Error decoding received audio, dropping it: {:#}", e);
                return Ok(None);
            }
        };

        apply_gain(&mut clip.samples, self.settings.get().amplification);

        let duration = clip.duration();
        match self.speaker.play(clip).await {
            Ok(handle) => {
                self.failures = 0;
                debug!("Playing clip {} ({:?})", handle.id(), duration);
                Ok(Some(handle))
            }
            Err(e) => {
                self.failures += 1;
                if self.failures >= self.max_failures {
                    return Err(CallError::Device(format!(
                        "playback failed {} time(s) in a row: {:#}",
                        self.failures, e
                    )));
                }
                warn!(
                    "Error playing audio ({}/{}): {:#}",
                    self.failures, self.max_failures, e
                );
                Ok(None)
            }
        }
    }
}

async fn clip_finished(current: &mut Option<PlaybackHandle>) {
    match current {
        Some(handle) => handle.finished().await,
        None => std::future::pending().await,
    }
}
