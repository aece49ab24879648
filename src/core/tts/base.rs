//! Base types shared by the speech synthesis client.
//!
//! Errors are reported through [`TTSError`]; audio is handed to callers through
//! the [`AudioSink`] trait, either chunk by chunk or collected into an
//! [`AudioBuffer`].

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use super::azure::codec::FramePath;
use super::azure::transport::StopReason;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during speech synthesis.
#[derive(Debug, Error)]
pub enum TTSError {
    /// WebSocket handshake, DNS/TCP dial or handshake deadline failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Writing one outbound frame failed or missed its write deadline
    #[error("Failed to send {path} frame: {reason}")]
    SendFailed { path: FramePath, reason: String },

    /// The receive task stopped before the turn ended
    #[error("Stream failed: {0}")]
    StreamFailed(StopReason),

    /// The end-to-end synthesis deadline elapsed
    #[error("Synthesis timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the synthesis
    #[error("Synthesis cancelled")]
    Cancelled,

    /// The turn ended without a single audio byte
    #[error("No audio received for request {0}")]
    EmptyAudio(String),

    /// Voice catalog lookup failed
    #[error("Voice list request failed: {0}")]
    VoiceListFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl TTSError {
    /// Whether the failure happened before the request was accepted by the
    /// remote peer (connect or send stage), as opposed to mid-stream.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::SendFailed { .. })
    }
}

/// Result type for speech synthesis operations.
pub type TTSResult<T> = Result<T, TTSError>;

// =============================================================================
// Audio Sinks
// =============================================================================

/// Receiver of synthesized audio chunks.
///
/// Chunks arrive in the order the remote peer sent them. Closures taking
/// [`Bytes`] implement this trait, so `get_audio_stream(ssml, fmt, |chunk| ...)`
/// works without a wrapper type.
pub trait AudioSink: Send {
    fn on_audio(&mut self, chunk: Bytes);
}

impl<F> AudioSink for F
where
    F: FnMut(Bytes) + Send,
{
    fn on_audio(&mut self, chunk: Bytes) {
        self(chunk)
    }
}

/// Sink that concatenates every chunk into one contiguous buffer.
#[derive(Debug, Default)]
pub struct AudioBuffer {
    data: BytesMut,
    chunks: usize,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks received so far, including empty ones.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }
}

impl AudioSink for AudioBuffer {
    fn on_audio(&mut self, chunk: Bytes) {
        self.chunks += 1;
        self.data.extend_from_slice(&chunk);
    }
}
