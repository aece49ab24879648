//! Frame codec for the speech WebSocket protocol.
//!
//! The protocol has no self-describing envelope. Frame kind comes from the
//! WebSocket message type and sub-fields are found by substring search:
//!
//! ```text
//! text   : "Path: ssml\r\nX-RequestId: <id>\r\n...\r\n\r\n<body>"
//! binary : [u16 BE header len]["X-RequestId:<id>\r\n...Path:audio\r\n"][payload]
//! ```
//!
//! All of that is confined to [`decode`], which turns a raw frame into a typed
//! [`InboundFrame`] or a [`MalformedFrame`] error. Nothing here does I/O.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::messages::{SpeechConfigMessage, SynthesisContextMessage};
use crate::core::tts::base::{TTSError, TTSResult};

/// Marker introducing the audio payload inside a binary frame header.
pub const AUDIO_MARKER: &[u8] = b"Path:audio";

/// Width of the separator (CRLF) between [`AUDIO_MARKER`] and the payload.
pub const AUDIO_SEPARATOR_LEN: usize = 2;

/// Marker the service puts near the end of the final text frame of a turn.
pub const TURN_END_MARKER: &[u8] = b"turn.end";

/// Bytes that follow the turn end marker (`\r\n\r\n{}`).
const TURN_END_TRAILER_LEN: usize = 6;

/// Message types of outbound frames. Each one is also a distinct send stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePath {
    /// Client identity metadata
    SpeechConfig,
    /// Output format and metadata options
    SynthesisContext,
    /// The synthesis request itself
    Ssml,
}

impl FramePath {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpeechConfig => "speech.config",
            Self::SynthesisContext => "synthesis.context",
            Self::Ssml => "ssml",
        }
    }

    #[inline]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::SpeechConfig | Self::SynthesisContext => "application/json",
            Self::Ssml => "application/ssml+xml",
        }
    }
}

impl fmt::Display for FramePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Outbound Frames
// =============================================================================

/// A textual frame ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    path: FramePath,
    request_id: String,
    timestamp: String,
    body: String,
}

impl OutboundFrame {
    pub fn new(
        path: FramePath,
        request_id: impl Into<String>,
        timestamp: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            path,
            request_id: request_id.into(),
            timestamp: timestamp.into(),
            body: body.into(),
        }
    }

    pub fn path(&self) -> FramePath {
        self.path
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Render the frame in wire format.
    pub fn encode(&self) -> String {
        format!(
            "Path: {}\r\nX-RequestId: {}\r\nX-Timestamp: {}\r\nContent-Type: {}\r\n\r\n{}",
            self.path,
            self.request_id,
            self.timestamp,
            self.path.content_type(),
            self.body
        )
    }

    pub fn into_message(self) -> Message {
        Message::Text(self.encode().into())
    }
}

fn json_body<T: Serialize>(path: FramePath, value: &T) -> TTSResult<String> {
    serde_json::to_string(value).map_err(|e| {
        TTSError::SerializationError(format!("Failed to serialize {path} body: {e}"))
    })
}

/// Build the `speech.config` and `synthesis.context` frames for a session.
///
/// Both frames share the same timestamp.
pub fn build_config_frames(
    session_id: &str,
    timestamp: &str,
    output_format: &str,
) -> TTSResult<(OutboundFrame, OutboundFrame)> {
    let speech_config = OutboundFrame::new(
        FramePath::SpeechConfig,
        session_id,
        timestamp,
        json_body(FramePath::SpeechConfig, &SpeechConfigMessage::default())?,
    );
    let synthesis_context = OutboundFrame::new(
        FramePath::SynthesisContext,
        session_id,
        timestamp,
        json_body(
            FramePath::SynthesisContext,
            &SynthesisContextMessage::new(output_format),
        )?,
    );
    Ok((speech_config, synthesis_context))
}

/// Build the `ssml` request frame carrying the markup document.
pub fn build_request_frame(session_id: &str, timestamp: &str, ssml: &str) -> OutboundFrame {
    OutboundFrame::new(FramePath::Ssml, session_id, timestamp, ssml)
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// A raw data frame as read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(Bytes),
    Binary(Bytes),
}

impl WireFrame {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(data) | Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded meaning of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// The service accepted the request and started producing audio
    TurnStart,
    /// One chunk of synthesized audio (may be empty)
    AudioChunk(Bytes),
    /// The service finished the turn
    TurnEnd,
    /// Any other control frame (`response`, `audio.metadata`, ...)
    Other { path: Option<String> },
}

/// A decoded inbound frame and the request it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Value of the `X-RequestId` header, when the frame carries one
    pub request_id: Option<String>,
    pub message: InboundMessage,
}

/// Inbound frame the codec could not make sense of.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedFrame {
    #[error("binary frame of {len} bytes has no audio marker")]
    MissingAudioMarker { len: usize },

    #[error("binary frame of {len} bytes ends inside the audio header at offset {marker_at}")]
    TruncatedAudioHeader { marker_at: usize, len: usize },
}

/// Decode one inbound frame.
pub fn decode(frame: WireFrame) -> Result<InboundFrame, MalformedFrame> {
    match frame {
        WireFrame::Binary(data) => decode_binary(data),
        WireFrame::Text(data) => Ok(decode_text(&data)),
    }
}

/// Whether the trailing slice `[len-14, len-6)` of a text frame is `turn.end`.
pub fn is_turn_end(data: &[u8]) -> bool {
    let window = TURN_END_MARKER.len() + TURN_END_TRAILER_LEN;
    data.len() >= window
        && &data[data.len() - window..data.len() - TURN_END_TRAILER_LEN] == TURN_END_MARKER
}

fn decode_binary(data: Bytes) -> Result<InboundFrame, MalformedFrame> {
    let len = data.len();
    let marker_at =
        find(&data, AUDIO_MARKER).ok_or(MalformedFrame::MissingAudioMarker { len })?;
    let payload_start = marker_at + AUDIO_MARKER.len() + AUDIO_SEPARATOR_LEN;
    if payload_start > len {
        return Err(MalformedFrame::TruncatedAudioHeader { marker_at, len });
    }

    // Skip the 2-byte header length prefix; it is not text.
    let header_start = marker_at.min(2);
    let header = String::from_utf8_lossy(&data[header_start..marker_at]);
    let request_id = header_value(&header, "X-RequestId").map(str::to_owned);

    Ok(InboundFrame {
        request_id,
        message: InboundMessage::AudioChunk(data.slice(payload_start..)),
    })
}

fn decode_text(data: &[u8]) -> InboundFrame {
    let text = String::from_utf8_lossy(data);
    let header = text.split_once("\r\n\r\n").map_or(&*text, |(head, _)| head);
    let request_id = header_value(header, "X-RequestId").map(str::to_owned);
    let path = header_value(header, "Path");

    let message = if is_turn_end(data) || path.is_some_and(|p| p.eq_ignore_ascii_case("turn.end"))
    {
        InboundMessage::TurnEnd
    } else if path.is_some_and(|p| p.eq_ignore_ascii_case("turn.start")) {
        InboundMessage::TurnStart
    } else {
        InboundMessage::Other {
            path: path.map(str::to_owned),
        }
    };

    InboundFrame {
        request_id,
        message,
    }
}

/// Look up a header in a CRLF separated `Key:Value` block (case-insensitive key).
fn header_value<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    block.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
            .filter(|v| !v.is_empty())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
