//! Configuration types for the Azure speech synthesis WebSocket client.
//!
//! This module contains:
//! - Endpoint and browser-impersonation constants
//! - Output audio formats understood by the service
//! - [`AzureTTSConfig`], the per-client transport and session knobs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::core::tts::base::{TTSError, TTSResult};

// =============================================================================
// Endpoints and Limits
// =============================================================================

/// WebSocket endpoint template. The connection id is appended as `X-ConnectionId`.
pub const AZURE_TTS_WS_URL: &str = "wss://eastus.api.speech.microsoft.com/cognitiveservices/websocket/v1?TricType=AzureDemo&Authorization=bearer%20undefined";

/// Voice list endpoint.
pub const AZURE_VOICES_URL: &str =
    "https://eastus.api.speech.microsoft.com/cognitiveservices/voices/list";

/// Query parameter carrying the connection id.
pub const CONNECTION_ID_PARAM: &str = "X-ConnectionId";

/// Deadline for the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for writing a single frame.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Cumulative inbound bytes after which a connection is forcibly dropped.
pub const DEFAULT_MAX_INBOUND_BYTES: usize = 2_000_000;

/// End-to-end deadline for one synthesis call.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

// The service only accepts clients that look like the browser demo page.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 7.1.2; M2012K11AC Build/N6F26Q; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/81.0.4044.117 Mobile Safari/537.36";
pub const BROWSER_ORIGIN: &str = "https://azure.microsoft.com";
pub const BROWSER_ACCEPT_ENCODING: &str = "gzip, deflate, br";

// =============================================================================
// Output Formats
// =============================================================================

/// Output audio formats accepted in the `synthesis.context` frame.
///
/// The client APIs take the format as a plain string so formats missing from
/// this list still work; the enum exists for validation and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AzureAudioFormat {
    Audio16Khz32KBitRateMonoMp3,
    Audio16Khz64KBitRateMonoMp3,
    Audio16Khz128KBitRateMonoMp3,
    /// Default: small MP3 at 24kHz
    #[default]
    Audio24Khz48KBitRateMonoMp3,
    Audio24Khz96KBitRateMonoMp3,
    Audio24Khz160KBitRateMonoMp3,
    Audio48Khz96KBitRateMonoMp3,
    Audio48Khz192KBitRateMonoMp3,
    Riff16Khz16BitMonoPcm,
    Riff24Khz16BitMonoPcm,
    Riff48Khz16BitMonoPcm,
    Raw16Khz16BitMonoPcm,
    Raw24Khz16BitMonoPcm,
    Raw48Khz16BitMonoPcm,
    Ogg16Khz16BitMonoOpus,
    Ogg24Khz16BitMonoOpus,
    Ogg48Khz16BitMonoOpus,
    Webm16Khz16BitMonoOpus,
    Webm24Khz16BitMonoOpus,
}

impl AzureAudioFormat {
    pub const ALL: [Self; 19] = [
        Self::Audio16Khz32KBitRateMonoMp3,
        Self::Audio16Khz64KBitRateMonoMp3,
        Self::Audio16Khz128KBitRateMonoMp3,
        Self::Audio24Khz48KBitRateMonoMp3,
        Self::Audio24Khz96KBitRateMonoMp3,
        Self::Audio24Khz160KBitRateMonoMp3,
        Self::Audio48Khz96KBitRateMonoMp3,
        Self::Audio48Khz192KBitRateMonoMp3,
        Self::Riff16Khz16BitMonoPcm,
        Self::Riff24Khz16BitMonoPcm,
        Self::Riff48Khz16BitMonoPcm,
        Self::Raw16Khz16BitMonoPcm,
        Self::Raw24Khz16BitMonoPcm,
        Self::Raw48Khz16BitMonoPcm,
        Self::Ogg16Khz16BitMonoOpus,
        Self::Ogg24Khz16BitMonoOpus,
        Self::Ogg48Khz16BitMonoOpus,
        Self::Webm16Khz16BitMonoOpus,
        Self::Webm24Khz16BitMonoOpus,
    ];

    /// Value sent as `outputFormat`.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio16Khz32KBitRateMonoMp3 => "audio-16khz-32kbitrate-mono-mp3",
            Self::Audio16Khz64KBitRateMonoMp3 => "audio-16khz-64kbitrate-mono-mp3",
            Self::Audio16Khz128KBitRateMonoMp3 => "audio-16khz-128kbitrate-mono-mp3",
            Self::Audio24Khz48KBitRateMonoMp3 => "audio-24khz-48kbitrate-mono-mp3",
            Self::Audio24Khz96KBitRateMonoMp3 => "audio-24khz-96kbitrate-mono-mp3",
            Self::Audio24Khz160KBitRateMonoMp3 => "audio-24khz-160kbitrate-mono-mp3",
            Self::Audio48Khz96KBitRateMonoMp3 => "audio-48khz-96kbitrate-mono-mp3",
            Self::Audio48Khz192KBitRateMonoMp3 => "audio-48khz-192kbitrate-mono-mp3",
            Self::Riff16Khz16BitMonoPcm => "riff-16khz-16bit-mono-pcm",
            Self::Riff24Khz16BitMonoPcm => "riff-24khz-16bit-mono-pcm",
            Self::Riff48Khz16BitMonoPcm => "riff-48khz-16bit-mono-pcm",
            Self::Raw16Khz16BitMonoPcm => "raw-16khz-16bit-mono-pcm",
            Self::Raw24Khz16BitMonoPcm => "raw-24khz-16bit-mono-pcm",
            Self::Raw48Khz16BitMonoPcm => "raw-48khz-16bit-mono-pcm",
            Self::Ogg16Khz16BitMonoOpus => "ogg-16khz-16bit-mono-opus",
            Self::Ogg24Khz16BitMonoOpus => "ogg-24khz-16bit-mono-opus",
            Self::Ogg48Khz16BitMonoOpus => "ogg-48khz-16bit-mono-opus",
            Self::Webm16Khz16BitMonoOpus => "webm-16khz-16bit-mono-opus",
            Self::Webm24Khz16BitMonoOpus => "webm-24khz-16bit-mono-opus",
        }
    }

    /// File extension matching the container.
    #[inline]
    pub fn file_extension(&self) -> &'static str {
        match self.as_str().split('-').next() {
            Some("audio") => "mp3",
            Some("riff") => "wav",
            Some("ogg") => "ogg",
            Some("webm") => "webm",
            _ => "pcm",
        }
    }
}

impl fmt::Display for AzureAudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AzureAudioFormat {
    type Err = TTSError;

    /// Parse from the service format name (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                TTSError::InvalidConfiguration(format!("Unknown Azure output format: {s}"))
            })
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Transport and session settings of an [`AzureTTS`](super::AzureTTS) client.
#[derive(Debug, Clone, PartialEq)]
pub struct AzureTTSConfig {
    /// WebSocket endpoint template (`ws://` or `wss://`)
    pub endpoint: String,

    /// Voice list endpoint (`http://` or `https://`)
    pub voices_url: String,

    /// Deadline for the WebSocket handshake
    pub handshake_timeout: Duration,

    /// Deadline for writing one outbound frame
    pub write_timeout: Duration,

    /// Inbound byte ceiling per connection
    pub max_inbound_bytes: usize,

    /// End-to-end deadline of a synthesis call; `None` waits forever
    pub synthesis_timeout: Option<Duration>,
}

impl Default for AzureTTSConfig {
    fn default() -> Self {
        Self {
            endpoint: AZURE_TTS_WS_URL.to_string(),
            voices_url: AZURE_VOICES_URL.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_inbound_bytes: DEFAULT_MAX_INBOUND_BYTES,
            synthesis_timeout: Some(DEFAULT_SYNTHESIS_TIMEOUT),
        }
    }
}

impl AzureTTSConfig {
    /// Create a configuration pointing at a custom WebSocket endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Build the URL for a new connection.
    ///
    /// The endpoint's existing query string is kept verbatim and the
    /// connection id is appended to it.
    pub fn build_websocket_url(&self, connection_id: &str) -> TTSResult<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            TTSError::InvalidConfiguration(format!("Invalid endpoint {}: {e}", self.endpoint))
        })?;
        url.query_pairs_mut()
            .append_pair(CONNECTION_ID_PARAM, connection_id);
        Ok(url)
    }

    /// Check the configuration for values the client cannot work with.
    pub fn validate(&self) -> TTSResult<()> {
        let endpoint = Url::parse(&self.endpoint).map_err(|e| {
            TTSError::InvalidConfiguration(format!("Invalid endpoint {}: {e}", self.endpoint))
        })?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(TTSError::InvalidConfiguration(format!(
                "Endpoint scheme must be ws or wss, got: {}",
                endpoint.scheme()
            )));
        }
        if endpoint.host_str().is_none() {
            return Err(TTSError::InvalidConfiguration(
                "Endpoint must have a host".to_string(),
            ));
        }

        let voices = Url::parse(&self.voices_url).map_err(|e| {
            TTSError::InvalidConfiguration(format!("Invalid voices URL {}: {e}", self.voices_url))
        })?;
        if !matches!(voices.scheme(), "http" | "https") {
            return Err(TTSError::InvalidConfiguration(format!(
                "Voices URL scheme must be http or https, got: {}",
                voices.scheme()
            )));
        }

        if self.max_inbound_bytes == 0 {
            return Err(TTSError::InvalidConfiguration(
                "max_inbound_bytes must be greater than zero".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(TTSError::InvalidConfiguration(
                "handshake and write timeouts must be greater than zero".to_string(),
            ));
        }
        if self.synthesis_timeout.is_some_and(|t| t.is_zero()) {
            return Err(TTSError::InvalidConfiguration(
                "synthesis_timeout must be greater than zero (use None to disable)".to_string(),
            ));
        }
        Ok(())
    }
}
