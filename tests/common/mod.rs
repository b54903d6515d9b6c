// In-memory microphone, speaker and connector for call tests
//
// Each double shares a controls struct with the test so that behavior can be scripted
// and observed after the device has been boxed and handed to the session.

#![allow(dead_code)]

use anyhow::{bail, Result};
use chrono::Utc;
use duplex_call::audio::{
    encode_wav, share_capture, share_playback, AudioCaptureDevice, AudioClip, AudioFormat,
    AudioMode, AudioPlaybackDevice, AudioSegment, AudioSettingsHandle, Permission,
    PlaybackHandle, SharedCaptureDevice, SharedPlaybackDevice,
};
use duplex_call::transport::{Connector, FrameSink, Link, WireFrame};
use duplex_call::{CallConfig, CallError, CallResult, CallSession, CallState, CallStatus};
use futures::channel::mpsc as fmpsc;
use futures::{Sink, SinkExt, StreamExt};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const SAMPLE_RATE: u32 = 8000;

pub fn test_format() -> AudioFormat {
    AudioFormat::pcm16(SAMPLE_RATE, 1)
}

/// Defaults with a small sample rate; timings are the production ones
pub fn test_config() -> CallConfig {
    CallConfig {
        endpoint: "ws://test.invalid/call".to_string(),
        sample_rate: SAMPLE_RATE,
        channels: 1,
        ..CallConfig::default()
    }
}

// ============================================================================
// Microphone
// ============================================================================

#[derive(Default)]
pub struct MicControls {
    pub deny_permission: AtomicBool,
    pub fail_configure: AtomicBool,
    /// Every capture fails
    pub always_fail: AtomicBool,
    /// The next N captures fail
    pub fail_next: AtomicU32,
    pub captures_started: AtomicU32,
    pub captures_completed: AtomicU32,
    /// Configured and not yet released
    pub held: AtomicBool,
    pub releases: AtomicU32,
}

impl MicControls {
    pub fn started(&self) -> u32 {
        self.captures_started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u32 {
        self.captures_completed.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// Produces segments whose samples all equal the capture's completion index
pub struct MockMicrophone {
    controls: Arc<MicControls>,
}

impl MockMicrophone {
    pub fn new() -> (Self, Arc<MicControls>) {
        let controls = Arc::new(MicControls::default());
        (
            Self {
                controls: Arc::clone(&controls),
            },
            controls,
        )
    }
}

#[async_trait::async_trait]
impl AudioCaptureDevice for MockMicrophone {
    async fn request_permission(&mut self) -> Result<Permission> {
        if self.controls.deny_permission.load(Ordering::SeqCst) {
            Ok(Permission::Denied)
        } else {
            Ok(Permission::Granted)
        }
    }

    async fn configure(&mut self, format: &AudioFormat, mode: &AudioMode) -> Result<()> {
        if self.controls.fail_configure.load(Ordering::SeqCst) {
            bail!("audio session unavailable");
        }
        assert_eq!(*format, test_format());
        assert!(mode.allows_recording);
        self.controls.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn capture_segment(&mut self, duration: Duration) -> Result<AudioSegment> {
        self.controls.captures_started.fetch_add(1, Ordering::SeqCst);

        if self.controls.always_fail.load(Ordering::SeqCst) {
            bail!("microphone unplugged");
        }
        let failing = self.controls.fail_next.load(Ordering::SeqCst);
        if failing > 0 {
            self.controls.fail_next.store(failing - 1, Ordering::SeqCst);
            bail!("buffer underrun");
        }

        tokio::time::sleep(duration).await;

        let index = self.controls.captures_completed.fetch_add(1, Ordering::SeqCst);
        let format = test_format();
        Ok(AudioSegment {
            samples: vec![index as i16; format.samples_for(duration)],
            format,
            captured_at: Utc::now(),
        })
    }

    async fn release(&mut self) -> Result<()> {
        self.controls.held.store(false, Ordering::SeqCst);
        self.controls.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock microphone"
    }
}

// ============================================================================
// Speaker
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerEvent {
    Played { id: u64, first_sample: i16 },
    Stopped(u64),
    Released(u64),
}

#[derive(Default)]
pub struct SpeakerControls {
    /// Every play fails
    pub always_fail: AtomicBool,
    /// The next N plays fail
    pub fail_next: AtomicU32,
    pub failed_plays: AtomicU32,
    events: Mutex<Vec<SpeakerEvent>>,
}

impl SpeakerControls {
    pub fn events(&self) -> Vec<SpeakerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn failures(&self) -> u32 {
        self.failed_plays.load(Ordering::SeqCst)
    }

    fn push(&self, event: SpeakerEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn should_fail(&self) -> bool {
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        let failing = self.fail_next.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_next.store(failing - 1, Ordering::SeqCst);
            return true;
        }
        false
    }
}

pub struct MockSpeaker {
    controls: Arc<SpeakerControls>,
    next_id: u64,
    timers: Vec<(u64, JoinHandle<()>)>,
}

impl MockSpeaker {
    pub fn new() -> (Self, Arc<SpeakerControls>) {
        let controls = Arc::new(SpeakerControls::default());
        (
            Self {
                controls: Arc::clone(&controls),
                next_id: 0,
                timers: Vec::new(),
            },
            controls,
        )
    }
}

#[async_trait::async_trait]
impl AudioPlaybackDevice for MockSpeaker {
    async fn play(&mut self, clip: AudioClip) -> Result<PlaybackHandle> {
        if self.controls.should_fail() {
            self.controls.failed_plays.fetch_add(1, Ordering::SeqCst);
            bail!("output route lost");
        }

        let id = self.next_id;
        self.next_id += 1;

        self.controls.push(SpeakerEvent::Played {
            id,
            first_sample: clip.samples.first().copied().unwrap_or_default(),
        });

        let duration = clip.duration();
        let (done_tx, done_rx) = oneshot::channel();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = done_tx.send(());
        });
        self.timers.push((id, timer));

        Ok(PlaybackHandle::new(id, done_rx))
    }

    async fn stop(&mut self, handle: PlaybackHandle) -> Result<()> {
        let id = handle.id();
        self.timers.retain(|(timer_id, timer)| {
            if *timer_id == id {
                timer.abort();
            }
            *timer_id != id
        });
        self.controls.push(SpeakerEvent::Stopped(id));
        Ok(())
    }

    async fn release(&mut self, handle: PlaybackHandle) -> Result<()> {
        let id = handle.id();
        self.timers.retain(|(timer_id, _)| *timer_id != id);
        self.controls.push(SpeakerEvent::Released(id));
        Ok(())
    }

    fn name(&self) -> &str {
        "mock speaker"
    }
}

// ============================================================================
// Connector
// ============================================================================

/// The endpoint's side of one connection
pub struct ServerEnd {
    /// Frames sent by the client; ends when the client closes
    pub from_client: fmpsc::UnboundedReceiver<WireFrame>,
    /// Frames (or errors) delivered to the client; drop to close the connection
    pub to_client: fmpsc::UnboundedSender<CallResult<WireFrame>>,
}

impl ServerEnd {
    pub async fn send(&mut self, frame: WireFrame) -> Result<()> {
        self.to_client.send(Ok(frame)).await?;
        Ok(())
    }

    /// Next frame from the client, or None once it closed
    pub async fn recv(&mut self) -> Option<WireFrame> {
        self.from_client.next().await
    }

    /// Everything the client sends until it closes the connection
    pub async fn collect(mut self) -> Vec<WireFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.from_client.next().await {
            frames.push(frame);
        }
        frames
    }
}

#[derive(Default)]
pub struct ConnectorControls {
    /// Refuse every connection
    pub refuse: AtomicBool,
    /// Time the handshake takes
    pub connect_delay_ms: AtomicU32,
    /// Client writes and closes never complete
    pub stall_sink: AtomicBool,
    pub attempts: Mutex<Vec<Instant>>,
    /// Connections whose client side is still alive
    pub open: AtomicUsize,
}

impl ConnectorControls {
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// A socket whose send buffer never drains
struct StalledSink;

impl Sink<WireFrame> for StalledSink {
    type Error = CallError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<CallResult<()>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _frame: WireFrame) -> CallResult<()> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<CallResult<()>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<CallResult<()>> {
        Poll::Pending
    }
}

struct OpenGuard(Arc<ConnectorControls>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockConnector {
    controls: Arc<ConnectorControls>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    pub fn new() -> (Self, Arc<ConnectorControls>, mpsc::UnboundedReceiver<ServerEnd>) {
        let controls = Arc::new(ConnectorControls::default());
        let (servers, server_rx) = mpsc::unbounded_channel();
        (
            Self {
                controls: Arc::clone(&controls),
                servers,
            },
            controls,
            server_rx,
        )
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &str) -> CallResult<Link> {
        self.controls.attempts.lock().unwrap().push(Instant::now());

        let delay = self.controls.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        if self.controls.refuse.load(Ordering::SeqCst) {
            return Err(CallError::Transport("connection refused".to_string()));
        }

        let (client_tx, from_client) = fmpsc::unbounded::<WireFrame>();
        let (to_client, client_rx) = fmpsc::unbounded::<CallResult<WireFrame>>();

        self.controls.open.fetch_add(1, Ordering::SeqCst);
        let guard = OpenGuard(Arc::clone(&self.controls));

        let sink: FrameSink = if self.controls.stall_sink.load(Ordering::SeqCst) {
            Box::pin(StalledSink)
        } else {
            Box::pin(client_tx.sink_map_err(|e| CallError::Transport(e.to_string())))
        };
        let stream = client_rx.map(move |frame| {
            let _alive = &guard;
            frame
        });

        let _ = self.servers.send(ServerEnd {
            from_client,
            to_client,
        });

        Ok(Link {
            sink,
            stream: Box::pin(stream),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub session: CallSession,
    pub mic: Arc<MicControls>,
    pub speaker: Arc<SpeakerControls>,
    pub connector: Arc<ConnectorControls>,
    pub servers: mpsc::UnboundedReceiver<ServerEnd>,
    pub microphone: SharedCaptureDevice,
    pub speaker_device: SharedPlaybackDevice,
    pub settings: AudioSettingsHandle,
}

impl Harness {
    pub fn new(config: CallConfig) -> Self {
        let (microphone, mic) = MockMicrophone::new();
        let (speaker_device, speaker) = MockSpeaker::new();
        let (connector_impl, connector, servers) = MockConnector::new();

        let microphone = share_capture(microphone);
        let speaker_device = share_playback(speaker_device);
        let settings = AudioSettingsHandle::default();

        let session = CallSession::new(
            config,
            Arc::clone(&microphone),
            Arc::clone(&speaker_device),
            Arc::new(connector_impl),
            settings.clone(),
        );

        Self {
            session,
            mic,
            speaker,
            connector,
            servers,
            microphone,
            speaker_device,
            settings,
        }
    }

    /// Next connection opened by the session
    pub async fn next_server(&mut self) -> Result<ServerEnd> {
        match tokio::time::timeout(Duration::from_secs(60), self.servers.recv()).await? {
            Some(server) => Ok(server),
            None => bail!("connector dropped"),
        }
    }

    pub async fn wait_for_state(&self, state: CallState) -> Result<CallStatus> {
        let mut rx = self.session.subscribe();
        let status = tokio::time::timeout(
            Duration::from_secs(60),
            rx.wait_for(|s| s.state == state),
        )
        .await??;
        Ok(status.clone())
    }
}

/// A WAV clip of `seconds` whose samples all equal `value`
pub fn wav_clip(value: i16, seconds: u32) -> Vec<u8> {
    let format = test_format();
    let samples = vec![value; (SAMPLE_RATE * seconds) as usize];
    encode_wav(&format, &samples).unwrap()
}

/// First sample of a segment sent as a WAV payload
pub fn segment_value(bytes: &[u8]) -> i16 {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    reader.samples::<i16>().next().unwrap().unwrap()
}

/// Sample values of binary frames, in arrival order
pub fn frame_values(frames: &[WireFrame]) -> Vec<i16> {
    frames
        .iter()
        .map(|frame| match frame {
            WireFrame::Binary(bytes) => segment_value(bytes),
            WireFrame::Text(text) => panic!("expected binary frame, got text: {}", text),
        })
        .collect()
}
