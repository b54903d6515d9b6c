use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::messages::WireFrame;
use crate::error::{CallError, CallResult};
use crate::session::ConnectionState;

pub type FrameSink = Pin<Box<dyn Sink<WireFrame, Error = CallError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = CallResult<WireFrame>> + Send>>;

/// Both halves of an established channel
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens message channels to the call endpoint
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> CallResult<Link>;

    /// Get connector name for logging
    fn name(&self) -> &str;
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One established connection to the endpoint
///
/// A fresh instance is created for every (re)connect; a closed connection is
/// never reused.
pub struct TransportConnection {
    id: u64,
    endpoint: String,
    state: ConnectionState,
    link: Link,
}

impl TransportConnection {
    pub fn new(endpoint: &str, link: Link) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            endpoint: endpoint.to_string(),
            state: ConnectionState::Open,
            link,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn send(&mut self, frame: WireFrame) -> CallResult<()> {
        if self.state != ConnectionState::Open {
            return Err(CallError::Transport(format!(
                "Connection {} is {:?}",
                self.id, self.state
            )));
        }

        if let Err(e) = self.link.sink.send(frame).await {
            self.state = ConnectionState::Closed;
            return Err(e);
        }

        Ok(())
    }

    /// Next inbound frame; None once the remote side has closed
    pub async fn recv(&mut self) -> Option<CallResult<WireFrame>> {
        if self.state != ConnectionState::Open {
            return None;
        }

        let next = self.link.stream.next().await;
        if matches!(next, None | Some(Err(_))) {
            self.state = ConnectionState::Closed;
        }
        next
    }

    pub async fn close(mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        self.state = ConnectionState::Closing;
        debug!("Closing connection {} to {}", self.id, self.endpoint);

        if let Err(e) = self.link.sink.close().await {
            warn!("Error while closing connection {}: {}", self.id, e);
        }

        self.state = ConnectionState::Closed;
    }
}

impl From<WireFrame> for Message {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Text(text) => Message::Text(text),
            WireFrame::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

/// WebSocket connector (ws:// or wss://)
pub struct WebSocketConnector;

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> CallResult<Link> {
        info!("Connecting WebSocket to {}", endpoint);

        let (ws_stream, _response) = connect_async(endpoint)
            .await
            .map_err(|e| CallError::Transport(format!("Failed to connect: {}", e)))?;

        info!("WebSocket connected to {}", endpoint);

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| CallError::Transport(format!("Send failed: {}", e)))
            .with(|frame: WireFrame| futures::future::ready(Ok::<Message, CallError>(frame.into())));

        let stream = read.filter_map(|message| {
            futures::future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(WireFrame::Text(text))),
                Ok(Message::Binary(bytes)) => Some(Ok(WireFrame::Binary(bytes))),
                Ok(Message::Close(frame)) => Some(Err(CallError::Transport(match frame {
                    Some(frame) => format!("Closed by remote: {} {}", u16::from(frame.code), frame.reason),
                    None => "Closed by remote".to_string(),
                }))),
                // Ping/pong are answered by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(CallError::Transport(format!("Receive failed: {}", e)))),
            })
        });

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }

    fn name(&self) -> &str {
        "WebSocket"
    }
}
