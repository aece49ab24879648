//! Azure speech synthesis client.
//!
//! [`AzureTTS`] keeps one lazily opened WebSocket and runs one synthesis at a
//! time over it:
//!
//! ```text
//! idle ──▶ connecting ──▶ configuring ──▶ requesting ──▶ streaming ──▶ completed
//!               │              │               │             │
//!               └──────────────┴───────────────┴─────────────┴──────▶ failed
//! ```
//!
//! A call registers its session id with the connection's registry, writes the
//! `speech.config`, `synthesis.context` and `ssml` frames, then waits for the
//! first of: turn end, stream failure, deadline, cancellation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{OutboundFrame, build_config_frames, build_request_frame};
use super::config::AzureTTSConfig;
use super::messages::AzureVoice;
use super::session::{PendingSession, SessionEvent, SessionRegistry};
use super::transport::{Connection, StopReason};
use super::voices;
use crate::core::tts::base::{AudioBuffer, AudioSink, TTSError, TTSResult};
use crate::utils::{ensure_crypto_provider, iso_timestamp, new_session_id};

#[derive(Clone)]
struct LiveConnection {
    connection: Arc<Connection>,
    registry: Arc<SessionRegistry>,
}

/// Streaming client for the Azure speech WebSocket protocol.
pub struct AzureTTS {
    config: AzureTTSConfig,
    connection: Mutex<Option<LiveConnection>>,
    /// Serializes synthesis calls; one request in flight per connection.
    call_gate: Mutex<()>,
}

impl AzureTTS {
    pub fn new(config: AzureTTSConfig) -> TTSResult<Self> {
        config.validate()?;
        ensure_crypto_provider();

        Ok(Self {
            config,
            connection: Mutex::new(None),
            call_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AzureTTSConfig {
        &self.config
    }

    /// Whether a live connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|live| live.connection.is_alive())
    }

    // =========================================================================
    // Synthesis
    // =========================================================================

    /// Synthesize `ssml` and return the complete audio.
    ///
    /// A turn that ends without any audio is reported as
    /// [`TTSError::EmptyAudio`].
    pub async fn get_audio(&self, ssml: &str, output_format: &str) -> TTSResult<Bytes> {
        self.get_audio_with_cancel(ssml, output_format, &CancellationToken::new())
            .await
    }

    pub async fn get_audio_with_cancel(
        &self,
        ssml: &str,
        output_format: &str,
        cancel: &CancellationToken,
    ) -> TTSResult<Bytes> {
        let mut buffer = AudioBuffer::new();
        let session_id = self
            .synthesize(ssml, output_format, &mut buffer, cancel)
            .await?;

        if buffer.is_empty() {
            return Err(TTSError::EmptyAudio(session_id));
        }
        Ok(buffer.into_bytes())
    }

    /// Synthesize `ssml`, handing each audio chunk to `sink` as it arrives.
    ///
    /// Returns once the service ends the turn.
    pub async fn get_audio_stream<S>(
        &self,
        ssml: &str,
        output_format: &str,
        sink: S,
    ) -> TTSResult<()>
    where
        S: AudioSink,
    {
        self.get_audio_stream_with_cancel(ssml, output_format, sink, &CancellationToken::new())
            .await
    }

    pub async fn get_audio_stream_with_cancel<S>(
        &self,
        ssml: &str,
        output_format: &str,
        mut sink: S,
        cancel: &CancellationToken,
    ) -> TTSResult<()>
    where
        S: AudioSink,
    {
        self.synthesize(ssml, output_format, &mut sink, cancel)
            .await
            .map(|_| ())
    }

    /// Fetch the raw voice list from the configured voices URL.
    pub async fn get_voices(&self) -> TTSResult<Bytes> {
        voices::get_voices(&self.config.voices_url).await
    }

    /// Fetch and parse the voice list from the configured voices URL.
    pub async fn list_voices(&self) -> TTSResult<Vec<AzureVoice>> {
        voices::list_voices(&self.config.voices_url).await
    }

    /// Close the current connection, if any. Safe to call repeatedly.
    ///
    /// A synthesis in flight on the closed connection fails with
    /// [`StopReason::CallerClosed`].
    pub async fn close(&self) {
        let live = self.connection.lock().await.take();
        match live {
            Some(live) => live.connection.close().await,
            None => debug!("close() called without an open connection"),
        }
    }

    /// Run one session. Returns the session id on turn end.
    async fn synthesize(
        &self,
        ssml: &str,
        output_format: &str,
        sink: &mut dyn AudioSink,
        cancel: &CancellationToken,
    ) -> TTSResult<String> {
        let _gate = self.call_gate.lock().await;
        if cancel.is_cancelled() {
            return Err(TTSError::Cancelled);
        }

        let session_id = new_session_id();
        let live = self.ensure_connection(&session_id).await?;
        let mut session = live.registry.register(&session_id);

        let timestamp = iso_timestamp();
        let (speech_config, synthesis_context) =
            build_config_frames(&session_id, &timestamp, output_format)?;
        let request = build_request_frame(&session_id, &iso_timestamp(), ssml);

        debug!(
            "Starting synthesis {} ({} bytes of SSML, format {})",
            session_id,
            ssml.len(),
            output_format
        );

        let synthesis_timeout = self.config.synthesis_timeout;
        let deadline = async {
            match synthesis_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TTSError::Cancelled),
            _ = deadline => Err(TTSError::Timeout(synthesis_timeout.unwrap_or(Duration::ZERO))),
            result = run_session(
                &live.connection,
                &mut session,
                [speech_config, synthesis_context, request],
                sink,
            ) => result,
        };

        drop(session);

        match result {
            Ok(stats) => {
                info!(
                    "Synthesis {} completed: {} bytes in {} chunks",
                    session_id, stats.bytes, stats.chunks
                );
                Ok(session_id)
            }
            Err(err) => {
                warn!("Synthesis {} failed: {}", session_id, err);
                // Late frames of an abandoned request must not reach the next one
                if matches!(
                    err,
                    TTSError::Cancelled | TTSError::Timeout(_) | TTSError::StreamFailed(_)
                ) {
                    self.invalidate(&live.connection).await;
                }
                Err(err)
            }
        }
    }

    /// Return the live connection, opening a new one when there is none.
    async fn ensure_connection(&self, connection_id: &str) -> TTSResult<LiveConnection> {
        let mut slot = self.connection.lock().await;

        if let Some(live) = slot.as_ref()
            && live.connection.is_alive()
        {
            return Ok(live.clone());
        }

        if let Some(stale) = slot.take() {
            debug!("Discarding stale connection {}", stale.connection.id());
        }

        let registry = Arc::new(SessionRegistry::new());
        let connection = Connection::connect(&self.config, connection_id, registry.clone()).await?;
        let live = LiveConnection {
            connection: Arc::new(connection),
            registry,
        };
        *slot = Some(live.clone());
        Ok(live)
    }

    async fn invalidate(&self, connection: &Arc<Connection>) {
        {
            let mut slot = self.connection.lock().await;
            if slot
                .as_ref()
                .is_some_and(|live| Arc::ptr_eq(&live.connection, connection))
            {
                *slot = None;
            }
        }
        connection.close().await;
    }
}

#[derive(Debug, Default)]
struct SessionStats {
    bytes: usize,
    chunks: usize,
}

async fn run_session(
    connection: &Connection,
    session: &mut PendingSession,
    frames: [OutboundFrame; 3],
    sink: &mut dyn AudioSink,
) -> TTSResult<SessionStats> {
    connection.send_all(frames).await?;
    debug!("Request {} sent, waiting for audio", session.id());

    let mut stats = SessionStats::default();
    loop {
        match session.next_event().await {
            Some(SessionEvent::Audio(chunk)) => {
                stats.bytes += chunk.len();
                stats.chunks += 1;
                sink.on_audio(chunk);
            }
            Some(SessionEvent::TurnEnd) => return Ok(stats),
            Some(SessionEvent::Failed(reason)) => return Err(TTSError::StreamFailed(reason)),
            None => return Err(TTSError::StreamFailed(StopReason::CallerClosed)),
        }
    }
}
