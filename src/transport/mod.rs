//! Transport to the call endpoint
//!
//! - `connection`: one message channel per (re)connect, plus the WebSocket connector
//! - `buffer`: bounded FIFO for payloads produced while the connection is down
//! - `reconnect`: fixed-backoff reconnect policy
//! - `manager`: the per-call task tying them together
//! - `messages`: wire framing and inbound classification

pub mod buffer;
pub mod connection;
pub mod manager;
pub mod messages;
pub mod reconnect;

pub use buffer::{OutboundBuffer, OverflowPolicy};
pub use connection::{Connector, FrameSink, FrameStream, Link, TransportConnection, WebSocketConnector};
pub use manager::{ConnectionManager, TransportConfig, TransportHandle};
pub use messages::{
    classify, AudioPayload, AudioUpload, InboundMessage, OutboundPayload, PayloadEncoding, WireFrame,
};
pub use reconnect::ReconnectPolicy;
