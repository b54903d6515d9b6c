use std::time::Duration;
use tokio::sync::{watch, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::audio::{apply_gain, encode_wav, AudioCaptureDevice, AudioSettingsHandle};
use crate::error::CallError;
use crate::session::{stopped, CallMonitor, CallStatus};
use crate::transport::{OutboundPayload, TransportHandle};

/// Timing and retry settings of the capture loop
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Length of each captured segment
    pub segment_duration: Duration,
    /// Pause before retrying a failed capture
    pub retry_delay: Duration,
    /// Failed attempts tolerated per segment before the call is failed
    pub max_attempts: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            segment_duration: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

/// Segmented record-and-transmit loop
///
/// Holds the microphone for its whole life and releases it on exit.
pub struct RecordingLoop {
    microphone: OwnedMutexGuard<Box<dyn AudioCaptureDevice>>,
    config: RecordingConfig,
    settings: AudioSettingsHandle,
    transport: TransportHandle,
    monitor: CallMonitor,
    sequence: u64,
}

impl RecordingLoop {
    pub fn new(
        microphone: OwnedMutexGuard<Box<dyn AudioCaptureDevice>>,
        config: RecordingConfig,
        settings: AudioSettingsHandle,
        transport: TransportHandle,
        monitor: CallMonitor,
    ) -> Self {
        Self {
            microphone,
            config,
            settings,
            transport,
            monitor,
            sequence: 0,
        }
    }

    /// Capture until the call stops; Err means capture failed for good
    pub async fn run(mut self) -> Result<u64, CallError> {
        info!(
            "Recording loop started ({}, {:?} segments)",
            self.microphone.name(),
            self.config.segment_duration
        );

        let mut state_rx = self.monitor.subscribe();

        let outcome = loop {
            if !self.monitor.is_live() {
                debug!("Call is not active, stopping recording loop");
                break Ok(self.sequence);
            }

            match self.next_segment(&mut state_rx).await {
                Ok(Some(payload)) => {
                    if !self.monitor.is_live() {
                        debug!("Call stopped during encode, discarding segment {}", payload.sequence);
                        break Ok(self.sequence);
                    }
                    self.monitor.record_captured();
                    if let Err(e) = self.transport.send(payload) {
                        debug!("Segment not handed off: {}", e);
                    }
                }
                Ok(None) => {
                    debug!("Call stopped mid-segment, capture abandoned");
                    break Ok(self.sequence);
                }
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.microphone.release().await {
            warn!("Failed to release {}: {:#}", self.microphone.name(), e);
        }

        match &outcome {
            Ok(segments) => info!("Recording loop stopped after {} segment(s)", segments),
            Err(e) => error!("Recording loop failed: {}", e),
        }

        outcome
    }

    /// Capture and encode one segment, retrying transient failures
    ///
    /// Returns Ok(None) when the call stops first.
    async fn next_segment(
        &mut self,
        state_rx: &mut watch::Receiver<CallStatus>,
    ) -> Result<Option<OutboundPayload>, CallError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                result = self.capture_once() => result,
                _ = stopped(state_rx) => return Ok(None),
            };

            let err = match result {
                Ok(payload) => return Ok(Some(payload)),
                Err(e) => e,
            };

            if attempt >= self.config.max_attempts {
                return Err(CallError::Device(format!(
                    "Segment capture failed after {} attempt(s): {:#}",
                    attempt, err
                )));
            }

            warn!(
                "Error in recording cycle (attempt {}/{}): {:#}",
                attempt, self.config.max_attempts, err
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_delay) => {}
                _ = stopped(state_rx) => return Ok(None),
            }
        }
    }

    async fn capture_once(&mut self) -> anyhow::Result<OutboundPayload> {
        let mut segment = self
            .microphone
            .capture_segment(self.config.segment_duration)
            .await?;

        apply_gain(&mut segment.samples, self.settings.get().input_gain);

        let bytes = encode_wav(&segment.format, &segment.samples)?;

        let payload = OutboundPayload {
            sequence: self.sequence,
            captured_at: segment.captured_at,
            bytes,
        };
        self.sequence += 1;

        Ok(payload)
    }
}
