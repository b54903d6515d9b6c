use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::ClipContainer;
use crate::error::{CallError, CallResult};

/// One message on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Encoded audio segment waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    /// Capture order within the call
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    /// WAV container bytes
    pub bytes: Vec<u8>,
}

/// How outbound payloads are framed on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// Raw WAV bytes in a binary frame
    #[default]
    Binary,
    /// `{"audio": "<base64 WAV>"}` in a text frame
    Base64Json,
}

/// JSON body of a base64 upload
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioUpload {
    /// Base64-encoded WAV bytes
    pub audio: String,
}

impl PayloadEncoding {
    pub fn frame(&self, payload: &OutboundPayload) -> CallResult<WireFrame> {
        match self {
            PayloadEncoding::Binary => Ok(WireFrame::Binary(payload.bytes.clone())),
            PayloadEncoding::Base64Json => {
                let upload = AudioUpload {
                    audio: base64::engine::general_purpose::STANDARD.encode(&payload.bytes),
                };
                let json = serde_json::to_string(&upload)
                    .map_err(|e| CallError::Protocol(format!("Failed to encode upload: {}", e)))?;
                Ok(WireFrame::Text(json))
            }
        }
    }
}

/// Audio response carried by an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub container: ClipContainer,
    /// Transcription of the user's speech, if the endpoint sent one alongside
    pub transcription: Option<String>,
}

/// Classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    AudioPayload(AudioPayload),
    ControlMessage { kind: String, data: Value },
    Unrecognized(String),
}

/// Known fields of a server JSON message
#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    ai_response: Option<AiResponse>,
    transcription: Option<Value>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AiResponse {
    ai_audio: Option<String>,
}

/// Classify an inbound frame
///
/// Returns `Err(Protocol)` only for messages that claim to carry audio but
/// whose payload is malformed; everything else maps to a variant.
pub fn classify(frame: WireFrame) -> CallResult<InboundMessage> {
    match frame {
        WireFrame::Binary(bytes) => {
            if bytes.is_empty() {
                return Err(CallError::Protocol("Empty binary frame".to_string()));
            }
            let container = ClipContainer::sniff(&bytes);
            Ok(InboundMessage::AudioPayload(AudioPayload {
                bytes,
                container,
                transcription: None,
            }))
        }
        WireFrame::Text(text) => classify_text(text),
    }
}

fn classify_text(text: String) -> CallResult<InboundMessage> {
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => return Ok(InboundMessage::Unrecognized(text)),
    };

    let message: ServerMessage = match serde_json::from_value(value.clone()) {
        Ok(message) => message,
        // Valid JSON that is not an object
        Err(_) => return Ok(InboundMessage::Unrecognized(text)),
    };

    let transcription = message.transcription.as_ref().and_then(transcription_text);

    if let Some(response) = message.ai_response {
        return match response.ai_audio {
            Some(encoded) => audio_from_base64(&encoded, transcription),
            None => Ok(InboundMessage::ControlMessage {
                kind: "ai_response".to_string(),
                data: value,
            }),
        };
    }

    match message.kind.as_deref() {
        Some("audio_output") => match message.data {
            Some(Value::String(encoded)) => audio_from_base64(&encoded, transcription),
            _ => Err(CallError::Protocol(
                "audio_output message without string data".to_string(),
            )),
        },
        Some(kind) => Ok(InboundMessage::ControlMessage {
            kind: kind.to_string(),
            data: value,
        }),
        None if transcription.is_some() => Ok(InboundMessage::ControlMessage {
            kind: "transcription".to_string(),
            data: value,
        }),
        None => Ok(InboundMessage::Unrecognized(text)),
    }
}

fn audio_from_base64(encoded: &str, transcription: Option<String>) -> CallResult<InboundMessage> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| CallError::Protocol(format!("Invalid base64 audio: {}", e)))?;

    if bytes.is_empty() {
        return Err(CallError::Protocol("Empty audio payload".to_string()));
    }

    let container = ClipContainer::sniff(&bytes);
    Ok(InboundMessage::AudioPayload(AudioPayload {
        bytes,
        container,
        transcription,
    }))
}

/// Transcriptions arrive either as a plain string or as `{"text": ...}`
pub fn transcription_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
