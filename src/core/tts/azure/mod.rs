//! Azure speech synthesis over the browser-demo WebSocket protocol.
//!
//! The service streams synthesized audio for an SSML document over a
//! persistent WebSocket. Requests and control messages are text frames with
//! `Key: Value` headers; audio comes back in binary frames.
//!
//! # Modules
//!
//! - [`transport`]: connection, background receive task, byte ceiling
//! - [`codec`]: outbound frame building and inbound frame decoding
//! - [`session`]: routing of inbound frames to pending requests
//! - [`client`]: [`AzureTTS`], the public synthesis API
//! - [`voices`]: voice catalog lookup over HTTP
//! - [`ssml`]: SSML document builder
//!
//! # Example
//!
//! ```rust,ignore
//! use azure_speech_stream::core::tts::azure::{AzureTTS, AzureTTSConfig, SsmlBuilder};
//!
//! let tts = AzureTTS::new(AzureTTSConfig::default())?;
//! let ssml = SsmlBuilder::new("en-US-JennyNeural").build("Hello, world!");
//! let mp3 = tts.get_audio(&ssml, "audio-24khz-48kbitrate-mono-mp3").await?;
//! tts.close().await;
//! ```
//!
//! # Protocol
//!
//! ```text
//! client                                   service
//!   │── speech.config (identity JSON) ──────▶│
//!   │── synthesis.context (output format) ──▶│
//!   │── ssml (document) ────────────────────▶│
//!   │◀──────────────────── turn.start (text) ─│
//!   │◀────────────────────── audio (binary) ──│  repeated
//!   │◀────────────────────── turn.end (text) ─│
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod messages;
pub mod session;
pub mod ssml;
pub mod transport;
pub mod voices;

pub use client::AzureTTS;
pub use codec::{FramePath, InboundFrame, InboundMessage, MalformedFrame, OutboundFrame, WireFrame};
pub use config::{
    AZURE_TTS_WS_URL, AZURE_VOICES_URL, AzureAudioFormat, AzureTTSConfig,
    DEFAULT_MAX_INBOUND_BYTES,
};
pub use messages::AzureVoice;
pub use session::{SessionEvent, SessionRegistry};
pub use ssml::{DEFAULT_VOICE, SsmlBuilder};
pub use transport::{Connection, FrameDispatcher, StopReason, TaskState};
pub use voices::{get_voices, list_voices};
