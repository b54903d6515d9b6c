// Connection lifecycle for one call
//
// The manager owns the outbound buffer, the reconnect policy and at most one
// TransportConnection at a time. It runs as a single task, so connects and
// reconnects are naturally single-flight:
//
//   Connecting ──ok──▶ Open ──close/error──▶ Closed ──(live, policy)──▶ backoff ──▶ Connecting
//        │                                      │
//        └──────────error──────────────────────▶┘──(stopped or policy refuses)──▶ done
//
// Outbound payloads arriving while not Open are buffered; the buffer drains
// oldest-first as soon as a connection opens.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::buffer::{OutboundBuffer, OverflowPolicy};
use super::connection::{Connector, TransportConnection};
use super::messages::{
    classify, transcription_text, InboundMessage, OutboundPayload, PayloadEncoding, WireFrame,
};
use super::reconnect::ReconnectPolicy;
use crate::error::CallError;
use crate::session::{stopped, CallMonitor, CallStatus, ConnectionState};

/// Sending half used by the recording loop
#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<OutboundPayload>,
}

impl TransportHandle {
    /// Hand a payload to the transport; it is sent now if the connection is
    /// open and buffered otherwise. Never blocks.
    pub fn send(&self, payload: OutboundPayload) -> Result<(), CallError> {
        self.tx
            .send(payload)
            .map_err(|_| CallError::Transport("Transport task has stopped".to_string()))
    }
}

/// Transport settings for one call
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub encoding: PayloadEncoding,
    pub reconnect: ReconnectPolicy,
    pub buffer_capacity: usize,
    pub overflow: OverflowPolicy,
}

/// Upper bound on the close handshake; the connection is dropped after it
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

enum Attempt {
    Opened(TransportConnection),
    Failed(CallError),
    Stopped,
}

/// Why an open connection stopped being served
enum Halt {
    Dropped(CallError),
    Stopped,
}

pub struct ConnectionManager {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    buffer: OutboundBuffer,
    outbound_rx: mpsc::UnboundedReceiver<OutboundPayload>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    fatal_tx: mpsc::UnboundedSender<CallError>,
    monitor: CallMonitor,
    state_rx: watch::Receiver<CallStatus>,
}

impl ConnectionManager {
    pub fn new(
        config: TransportConfig,
        connector: Arc<dyn Connector>,
        inbound_tx: mpsc::UnboundedSender<InboundMessage>,
        fatal_tx: mpsc::UnboundedSender<CallError>,
        monitor: CallMonitor,
    ) -> (Self, TransportHandle) {
        let (tx, outbound_rx) = mpsc::unbounded_channel();
        let buffer = OutboundBuffer::new(config.buffer_capacity, config.overflow);
        let state_rx = monitor.subscribe();

        let manager = Self {
            config,
            connector,
            buffer,
            outbound_rx,
            inbound_tx,
            fatal_tx,
            monitor,
            state_rx,
        };

        (manager, TransportHandle { tx })
    }

    /// Run until the call stops or the reconnect policy gives up
    pub async fn run(mut self) {
        info!(
            "Transport task started ({} via {})",
            self.config.endpoint,
            self.connector.name()
        );

        let mut failures: u32 = 0;

        loop {
            if !self.monitor.is_live() {
                break;
            }

            let reason = match self.connect().await {
                Attempt::Stopped => break,
                Attempt::Failed(e) => e,
                Attempt::Opened(connection) => {
                    failures = 0;
                    match self.serve(connection).await {
                        Halt::Stopped => break,
                        Halt::Dropped(e) => e,
                    }
                }
            };

            self.monitor.set_connection(ConnectionState::Closed);
            warn!("Connection to {} lost: {}", self.config.endpoint, reason);

            if !self.monitor.is_live() {
                info!("Call is not active, not attempting to reconnect");
                break;
            }

            failures += 1;
            let Some(delay) = self.config.reconnect.next_delay(failures) else {
                error!("Giving up on {} after {} failure(s)", self.config.endpoint, failures);
                let _ = self.fatal_tx.send(reason);
                break;
            };

            if !self.backoff(delay).await {
                break;
            }
            self.monitor.record_reconnect();
        }

        let discarded = self.buffer.clear();
        if discarded > 0 {
            info!("Discarded {} buffered segment(s)", discarded);
        }
        self.monitor.set_buffered(0);
        self.monitor.set_connection(ConnectionState::Closed);

        info!("Transport task stopped");
    }

    async fn connect(&mut self) -> Attempt {
        self.monitor.set_connection(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let endpoint = self.config.endpoint.clone();
        let connecting = connector.connect(&endpoint);
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                result = &mut connecting => {
                    return match result {
                        Ok(link) => Attempt::Opened(TransportConnection::new(&endpoint, link)),
                        Err(e) => Attempt::Failed(e),
                    };
                }
                Some(payload) = self.outbound_rx.recv() => self.enqueue(payload),
                _ = stopped(&mut self.state_rx) => return Attempt::Stopped,
            }
        }
    }

    async fn serve(&mut self, mut connection: TransportConnection) -> Halt {
        info!("Connection {} open", connection.id());
        self.monitor.set_connection(ConnectionState::Open);

        let halt = match self.drain(&mut connection).await {
            Ok(()) => self.exchange(&mut connection).await,
            Err(halt) => halt,
        };

        if let Halt::Stopped = halt {
            self.monitor.set_connection(ConnectionState::Closing);
            let id = connection.id();
            if tokio::time::timeout(CLOSE_TIMEOUT, connection.close()).await.is_err() {
                warn!("Connection {} did not close within {:?}, dropping it", id, CLOSE_TIMEOUT);
            }
        }

        halt
    }

    /// Relay frames both ways until the connection drops or the call stops
    async fn exchange(&mut self, connection: &mut TransportConnection) -> Halt {
        loop {
            tokio::select! {
                Some(payload) = self.outbound_rx.recv() => {
                    if let Err(halt) = self.transmit(connection, payload).await {
                        return halt;
                    }
                }
                frame = connection.recv() => match frame {
                    Some(Ok(frame)) => self.dispatch(frame),
                    Some(Err(e)) => return Halt::Dropped(e),
                    None => return Halt::Dropped(CallError::Transport("Connection closed".to_string())),
                },
                _ = stopped(&mut self.state_rx) => return Halt::Stopped,
            }
        }
    }

    /// Send everything buffered, oldest first
    async fn drain(&mut self, connection: &mut TransportConnection) -> Result<(), Halt> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        info!("Sending {} buffered segment(s)", self.buffer.len());

        while let Some(payload) = self.buffer.pop_front() {
            self.transmit(connection, payload).await?;
        }

        Ok(())
    }

    /// Write one payload; a stop during the write abandons it
    async fn transmit(
        &mut self,
        connection: &mut TransportConnection,
        payload: OutboundPayload,
    ) -> Result<(), Halt> {
        let frame = match self.config.encoding.frame(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping segment {}: {}", payload.sequence, e);
                return Ok(());
            }
        };

        let result = tokio::select! {
            result = connection.send(frame) => result,
            _ = stopped(&mut self.state_rx) => {
                debug!("Call stopped while sending segment {}", payload.sequence);
                return Err(Halt::Stopped);
            }
        };

        match result {
            Ok(()) => {
                debug!(
                    "Sent segment {} ({} bytes)",
                    payload.sequence,
                    payload.bytes.len()
                );
                self.monitor.record_sent(self.buffer.len());
                Ok(())
            }
            Err(e) => {
                if let Some(lost) = self.buffer.requeue(payload) {
                    self.report_overflow(lost);
                }
                self.monitor.set_buffered(self.buffer.len());
                Err(Halt::Dropped(e))
            }
        }
    }

    fn enqueue(&mut self, payload: OutboundPayload) {
        debug!("Connection not open, buffering segment {}", payload.sequence);
        if let Some(lost) = self.buffer.push(payload) {
            self.report_overflow(lost);
        }
        self.monitor.set_buffered(self.buffer.len());
    }

    fn report_overflow(&self, lost: OutboundPayload) {
        let err = CallError::BufferOverflow { dropped: 1 };
        warn!("{} (segment {}, policy {:?})", err, lost.sequence, self.buffer.policy());
        self.monitor.record_dropped(1);
    }

    fn dispatch(&mut self, frame: WireFrame) {
        let message = match classify(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping inbound message: {}", e);
                return;
            }
        };

        match &message {
            InboundMessage::AudioPayload(audio) => {
                debug!("Received audio payload, {} bytes", audio.bytes.len());
                self.monitor.record_received();
                if let Some(text) = &audio.transcription {
                    self.monitor.record_transcription(text.clone());
                }
            }
            InboundMessage::ControlMessage { kind, data } => {
                debug!("Received control message: {}", kind);
                if kind == "transcription" {
                    if let Some(text) = data.get("transcription").and_then(transcription_text) {
                        self.monitor.record_transcription(text);
                    }
                }
            }
            InboundMessage::Unrecognized(raw) => {
                info!("Ignoring unrecognized message: {}", truncate(raw, 80));
                return;
            }
        }

        if self.inbound_tx.send(message).is_err() {
            debug!("Playback router has stopped, dropping inbound message");
        }
    }

    async fn backoff(&mut self, delay: Duration) -> bool {
        info!("Reconnecting to {} in {:?}", self.config.endpoint, delay);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                Some(payload) = self.outbound_rx.recv() => self.enqueue(payload),
                _ = stopped(&mut self.state_rx) => {
                    info!("Call stopped, reconnect cancelled");
                    return false;
                }
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
