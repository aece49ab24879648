//! WebSocket Mock Server for the Azure speech protocol
//!
//! Accepts any number of connections. Every `ssml` frame is answered with the
//! next scripted reply sequence, or with the default sequence once the script
//! runs out.

use super::{audio_frame, frame_header, turn_end_frame, turn_start_frame};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// One scripted reply to an `ssml` request
#[derive(Debug, Clone)]
pub enum Reply {
    /// `turn.start` for the request
    TurnStart,
    /// Binary audio frame for the request
    Audio(Vec<u8>),
    /// Binary audio frame without `X-RequestId`
    AudioWithoutId(Vec<u8>),
    /// Binary audio frame addressed to another request id
    AudioFor(String, Vec<u8>),
    /// `turn.end` for the request
    TurnEnd,
    /// Arbitrary text frame
    RawText(String),
    /// Arbitrary binary frame
    RawBinary(Vec<u8>),
    /// Pause before the next reply
    Delay(Duration),
    /// Send a close frame and drop the connection
    Close,
}

/// Handshake details recorded for each accepted connection
#[derive(Debug, Clone)]
pub struct RecordedHandshake {
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedHandshake {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Shared mock server state
pub struct MockAzureState {
    pub connection_count: AtomicUsize,
    pub handshakes: Mutex<Vec<RecordedHandshake>>,
    pub frames: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Vec<Reply>>>,
    default_replies: Vec<Reply>,
}

impl MockAzureState {
    fn next_replies(&self) -> Vec<Reply> {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_replies.clone())
    }

    /// Text frames received so far, across all connections
    pub fn received_frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn connections(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }
}

/// Running mock server
pub struct MockAzureServer {
    pub addr: SocketAddr,
    pub state: Arc<MockAzureState>,
}

impl MockAzureServer {
    /// Start a server answering every request with `[TurnStart, Audio(b"mock audio"), TurnEnd]`
    pub async fn start() -> Self {
        Self::start_scripted(Vec::new()).await
    }

    /// Start a server answering the n-th request with `script[n]`
    pub async fn start_scripted(script: Vec<Vec<Reply>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockAzureState {
            connection_count: AtomicUsize::new(0),
            handshakes: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            default_replies: vec![
                Reply::TurnStart,
                Reply::Audio(b"mock audio".to_vec()),
                Reply::TurnEnd,
            ],
        });

        let server_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = server_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        eprintln!("Mock WebSocket error: {}", e);
                    }
                });
            }
        });

        Self { addr, state }
    }

    /// Endpoint with the same query string as the real service
    pub fn endpoint(&self) -> String {
        format!(
            "ws://{}/cognitiveservices/websocket/v1?TricType=AzureDemo&Authorization=bearer%20undefined",
            self.addr
        )
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockAzureState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let record_state = state.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let headers = request
            .headers()
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        record_state.handshakes.lock().push(RecordedHandshake {
            uri: request.uri().to_string(),
            headers,
        });
        Ok(response)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();
    state.connection_count.fetch_add(1, Ordering::SeqCst);

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let text = text.as_str().to_string();
                state.frames.lock().push(text.clone());

                if frame_header(&text, "Path") != Some("ssml") {
                    continue;
                }
                let request_id = frame_header(&text, "X-RequestId")
                    .unwrap_or_default()
                    .to_string();

                for reply in state.next_replies() {
                    let message = match reply {
                        Reply::TurnStart => Message::Text(turn_start_frame(&request_id).into()),
                        Reply::Audio(payload) => {
                            Message::Binary(audio_frame(Some(&request_id), &payload).into())
                        }
                        Reply::AudioWithoutId(payload) => {
                            Message::Binary(audio_frame(None, &payload).into())
                        }
                        Reply::AudioFor(other_id, payload) => {
                            Message::Binary(audio_frame(Some(&other_id), &payload).into())
                        }
                        Reply::TurnEnd => Message::Text(turn_end_frame(&request_id).into()),
                        Reply::RawText(text) => Message::Text(text.into()),
                        Reply::RawBinary(data) => Message::Binary(data.into()),
                        Reply::Delay(delay) => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        Reply::Close => {
                            write.send(Message::Close(None)).await?;
                            return Ok(());
                        }
                    };
                    write.send(message).await?;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    Ok(())
}
