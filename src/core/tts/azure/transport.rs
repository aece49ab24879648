//! WebSocket transport for the speech service.
//!
//! A [`Connection`] owns one duplexed WebSocket. The write half stays with the
//! connection behind an async mutex; the read half is moved into a background
//! receive task that hands every data frame to a [`FrameDispatcher`].
//!
//! ```text
//! ┌──────────────┐  send_all()  ┌───────────────┐
//! │  AzureTTS    │─────────────▶│  write half   │──────▶ service
//! └──────┬───────┘              └───────────────┘
//!        │ register(session)
//! ┌──────▼───────┐  on_frame()  ┌───────────────┐
//! │  dispatcher  │◀─────────────│ receive task  │◀────── service
//! └──────────────┘  on_stop()   └───────────────┘
//! ```
//!
//! The receive task runs until the peer closes, a read fails, the inbound
//! byte ceiling is reached, the dispatcher lets go, or the connection is
//! closed locally. Its state is published as [`TaskState`].

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::handshake::client::{Request, generate_key};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::codec::{OutboundFrame, WireFrame};
use super::config::{
    AzureTTSConfig, BROWSER_ACCEPT_ENCODING, BROWSER_ORIGIN, BROWSER_USER_AGENT,
};
use crate::core::tts::base::{TTSError, TTSResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

// =============================================================================
// Receive Task State
// =============================================================================

/// Why a receive task stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StopReason {
    /// Cumulative inbound bytes reached the per-connection ceiling
    #[error("inbound byte ceiling exceeded ({received} of {limit} bytes)")]
    CeilingExceeded { received: usize, limit: usize },

    /// Reading from the socket failed
    #[error("read error: {0}")]
    ReadFailed(String),

    /// The peer sent a close frame or the stream ended
    #[error("connection closed by peer ({0})")]
    PeerClosed(String),

    /// The connection was closed locally or the dispatcher let go
    #[error("connection closed by client")]
    CallerClosed,
}

/// Lifecycle of a receive task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Stopped(StopReason),
}

/// Consumer of the frames read by a receive task.
pub trait FrameDispatcher: Send + Sync + 'static {
    /// Handle one inbound data frame. `Break` stops the receive task.
    fn on_frame(&self, frame: WireFrame) -> ControlFlow<()>;

    /// Called exactly once when the receive task stops.
    fn on_stop(&self, reason: &StopReason);
}

// =============================================================================
// Connection
// =============================================================================

/// One live WebSocket connection to the speech service.
pub struct Connection {
    id: String,
    writer: Mutex<WsWriter>,
    write_timeout: Duration,
    state: watch::Receiver<TaskState>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Open a connection and start its receive task.
    ///
    /// `connection_id` goes into the `X-ConnectionId` query parameter.
    pub async fn connect(
        config: &AzureTTSConfig,
        connection_id: &str,
        dispatcher: Arc<dyn FrameDispatcher>,
    ) -> TTSResult<Self> {
        let url = config.build_websocket_url(connection_id)?;
        let request = build_handshake_request(&url)?;
        let host = url.host_str().unwrap_or_default().to_string();

        info!("Connecting to Azure speech WebSocket at {}", host);

        let ws_stream = match timeout(config.handshake_timeout, connect_async(request)).await {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                let err = TTSError::ConnectionFailed(format!("Failed to connect to {host}: {e}"));
                error!("{}", err);
                return Err(err);
            }
            Err(_elapsed) => {
                let err = TTSError::ConnectionFailed(format!(
                    "Handshake with {host} timed out after {:?}",
                    config.handshake_timeout
                ));
                error!("{}", err);
                return Err(err);
            }
        };

        info!("Connected to Azure speech WebSocket (connection {})", connection_id);

        let (writer, reader) = ws_stream.split();
        let (state_tx, state_rx) = watch::channel(TaskState::Running);
        let shutdown = CancellationToken::new();

        tokio::spawn(receive_loop(
            reader,
            dispatcher,
            config.max_inbound_bytes,
            shutdown.clone(),
            state_tx,
        ));

        Ok(Self {
            id: connection_id.to_string(),
            writer: Mutex::new(writer),
            write_timeout: config.write_timeout,
            state: state_rx,
            shutdown,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the connection can still carry a request.
    pub fn is_alive(&self) -> bool {
        !self.shutdown.is_cancelled() && matches!(*self.state.borrow(), TaskState::Running)
    }

    /// Current state of the receive task.
    pub fn task_state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Wait until the receive task has stopped and return why.
    pub async fn stopped(&self) -> StopReason {
        let mut state = self.state.clone();
        match state
            .wait_for(|s| matches!(s, TaskState::Stopped(_)))
            .await
        {
            Ok(s) => match &*s {
                TaskState::Stopped(reason) => reason.clone(),
                TaskState::Running => StopReason::CallerClosed,
            },
            Err(_) => StopReason::ReadFailed("receive task terminated".to_string()),
        }
    }

    /// Write frames in order, each under the write deadline.
    ///
    /// Stops at the first failure; later frames are not written.
    pub async fn send_all(
        &self,
        frames: impl IntoIterator<Item = OutboundFrame>,
    ) -> TTSResult<()> {
        let mut writer = self.writer.lock().await;
        write_frames(&mut *writer, frames, self.write_timeout).await
    }

    /// Best-effort graceful shutdown. Errors are ignored.
    pub async fn close(&self) {
        self.shutdown.cancel();

        let mut writer = self.writer.lock().await;
        let _ = timeout(self.write_timeout, writer.send(Message::Close(None))).await;
        let _ = timeout(self.write_timeout, writer.close()).await;

        info!("Closed Azure speech connection {}", self.id);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Build the WebSocket upgrade request with browser-like headers.
pub(crate) fn build_handshake_request(url: &Url) -> TTSResult<Request> {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(TTSError::InvalidConfiguration(format!(
                "Endpoint has no host: {url}"
            )));
        }
    };

    Request::builder()
        .method("GET")
        .uri(url.as_str())
        .header("Host", host)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", generate_key())
        .header("Sec-WebSocket-Version", "13")
        .header("User-Agent", BROWSER_USER_AGENT)
        .header("Origin", BROWSER_ORIGIN)
        .header("Accept-Encoding", BROWSER_ACCEPT_ENCODING)
        .body(())
        .map_err(|e| {
            TTSError::ConnectionFailed(format!("Failed to create WebSocket request: {e}"))
        })
}

// =============================================================================
// Frame Writing
// =============================================================================

pub(crate) async fn write_frames<W>(
    writer: &mut W,
    frames: impl IntoIterator<Item = OutboundFrame>,
    write_timeout: Duration,
) -> TTSResult<()>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    for frame in frames {
        write_frame(writer, frame, write_timeout).await?;
    }
    Ok(())
}

async fn write_frame<W>(writer: &mut W, frame: OutboundFrame, write_timeout: Duration) -> TTSResult<()>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let path = frame.path();
    let request_id = frame.request_id().to_string();

    match timeout(write_timeout, writer.send(frame.into_message())).await {
        Ok(Ok(())) => {
            debug!("Sent {} frame for request {}", path, request_id);
            Ok(())
        }
        Ok(Err(e)) => {
            let err = TTSError::SendFailed {
                path,
                reason: e.to_string(),
            };
            error!("{}", err);
            Err(err)
        }
        Err(_elapsed) => {
            let err = TTSError::SendFailed {
                path,
                reason: format!("write timed out after {write_timeout:?}"),
            };
            error!("{}", err);
            Err(err)
        }
    }
}

// =============================================================================
// Receive Task
// =============================================================================

pub(crate) async fn receive_loop<R>(
    mut reader: R,
    dispatcher: Arc<dyn FrameDispatcher>,
    max_inbound_bytes: usize,
    shutdown: CancellationToken,
    state_tx: watch::Sender<TaskState>,
) where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut received: usize = 0;

    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break StopReason::CallerClosed,
            next = reader.next() => next,
        };

        let frame = match next {
            Some(Ok(Message::Text(text))) => WireFrame::Text(Bytes::from(text)),
            Some(Ok(Message::Binary(data))) => WireFrame::Binary(data),
            Some(Ok(Message::Close(close_frame))) => {
                let detail = close_frame
                    .map(|f| format!("code {}: {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "close frame".to_string());
                break StopReason::PeerClosed(detail);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break StopReason::ReadFailed(e.to_string()),
            None => break StopReason::PeerClosed("end of stream".to_string()),
        };

        received = received.saturating_add(frame.len());
        if received >= max_inbound_bytes {
            break StopReason::CeilingExceeded {
                received,
                limit: max_inbound_bytes,
            };
        }

        if dispatcher.on_frame(frame).is_break() {
            break StopReason::CallerClosed;
        }
    };

    match &reason {
        StopReason::CallerClosed => debug!("Receive task stopped: {}", reason),
        StopReason::PeerClosed(_) => info!("Receive task stopped: {}", reason),
        StopReason::CeilingExceeded { .. } | StopReason::ReadFailed(_) => {
            warn!("Receive task stopped: {}", reason)
        }
    }

    shutdown.cancel();
    dispatcher.on_stop(&reason);
    state_tx.send_replace(TaskState::Stopped(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::azure::codec::{FramePath, build_config_frames, build_request_frame};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    // -------------------------------------------------------------------------
    // Test doubles
    // -------------------------------------------------------------------------

    /// Sink recording sent messages; the `fail_on`-th send (1-based) fails.
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Message>,
        fail_on: Option<usize>,
        stall: bool,
        attempts: usize,
    }

    impl Sink<Message> for RecordingSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            if self.stall {
                Poll::Pending
            } else {
                Poll::Ready(Ok(()))
            }
        }

        fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
            self.attempts += 1;
            if self.fail_on == Some(self.attempts) {
                return Err(WsError::ConnectionClosed);
            }
            self.sent.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        frames: parking_lot::Mutex<Vec<WireFrame>>,
        stops: parking_lot::Mutex<Vec<StopReason>>,
        break_after: Option<usize>,
    }

    impl FrameDispatcher for RecordingDispatcher {
        fn on_frame(&self, frame: WireFrame) -> ControlFlow<()> {
            let mut frames = self.frames.lock();
            frames.push(frame);
            if self.break_after == Some(frames.len()) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }

        fn on_stop(&self, reason: &StopReason) {
            self.stops.lock().push(reason.clone());
        }
    }

    fn request_frames() -> Vec<OutboundFrame> {
        let (config, context) =
            build_config_frames("abc", "2024-01-01T00:00:00.000Z", "riff-16khz-16bit-mono-pcm")
                .unwrap();
        let request = build_request_frame("abc", "2024-01-01T00:00:00.000Z", "<speak/>");
        vec![config, context, request]
    }

    async fn run_loop(
        messages: Vec<Result<Message, WsError>>,
        dispatcher: Arc<RecordingDispatcher>,
        limit: usize,
    ) -> TaskState {
        let (state_tx, state_rx) = watch::channel(TaskState::Running);
        receive_loop(
            futures::stream::iter(messages),
            dispatcher,
            limit,
            CancellationToken::new(),
            state_tx,
        )
        .await;
        let state = state_rx.borrow().clone();
        state
    }

    // -------------------------------------------------------------------------
    // Writing
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_write_frames_in_order() {
        let mut sink = RecordingSink::default();
        write_frames(&mut sink, request_frames(), Duration::from_secs(1))
            .await
            .unwrap();

        let paths: Vec<String> = sink
            .sent
            .iter()
            .map(|m| match m {
                Message::Text(t) => t.as_str().lines().next().unwrap_or_default().to_string(),
                other => panic!("Expected text frame, got {other:?}"),
            })
            .collect();
        assert_eq!(
            paths,
            vec!["Path: speech.config", "Path: synthesis.context", "Path: ssml"]
        );
    }

    #[tokio::test]
    async fn test_second_config_frame_failure_stops_sequence() {
        let mut sink = RecordingSink {
            fail_on: Some(2),
            ..Default::default()
        };

        let result = write_frames(&mut sink, request_frames(), Duration::from_secs(1)).await;

        match result {
            Err(TTSError::SendFailed { path, .. }) => {
                assert_eq!(path, FramePath::SynthesisContext)
            }
            other => panic!("Expected SendFailed, got {other:?}"),
        }
        // Only speech.config made it out; the ssml frame was never attempted
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.attempts, 2);
    }

    #[tokio::test]
    async fn test_write_deadline() {
        let mut sink = RecordingSink {
            stall: true,
            ..Default::default()
        };

        let result = write_frames(&mut sink, request_frames(), Duration::from_millis(50)).await;

        match result {
            Err(TTSError::SendFailed { path, reason }) => {
                assert_eq!(path, FramePath::SpeechConfig);
                assert!(reason.contains("timed out"));
            }
            other => panic!("Expected SendFailed, got {other:?}"),
        }
        assert!(sink.sent.is_empty());
    }

    // -------------------------------------------------------------------------
    // Receive loop
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_receive_loop_forwards_data_frames_in_order() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let state = run_loop(
            vec![
                Ok(Message::Binary(Bytes::from_static(b"one"))),
                Ok(Message::Ping(Bytes::from_static(b"p"))),
                Ok(Message::Text("two".into())),
            ],
            dispatcher.clone(),
            1_000,
        )
        .await;

        assert_eq!(
            *dispatcher.frames.lock(),
            vec![
                WireFrame::Binary(Bytes::from_static(b"one")),
                WireFrame::Text(Bytes::from_static(b"two")),
            ]
        );
        let expected = StopReason::PeerClosed("end of stream".to_string());
        assert_eq!(*dispatcher.stops.lock(), vec![expected.clone()]);
        assert_eq!(state, TaskState::Stopped(expected));
    }

    #[tokio::test]
    async fn test_receive_loop_ceiling_withholds_tripping_frame() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let state = run_loop(
            vec![
                Ok(Message::Binary(Bytes::from(vec![1u8; 4]))),
                Ok(Message::Binary(Bytes::from(vec![2u8; 4]))),
                Ok(Message::Binary(Bytes::from(vec![3u8; 4]))),
                Ok(Message::Text("after".into())),
            ],
            dispatcher.clone(),
            10,
        )
        .await;

        assert_eq!(dispatcher.frames.lock().len(), 2);
        let expected = StopReason::CeilingExceeded {
            received: 12,
            limit: 10,
        };
        assert_eq!(*dispatcher.stops.lock(), vec![expected.clone()]);
        assert_eq!(state, TaskState::Stopped(expected));
    }

    #[tokio::test]
    async fn test_receive_loop_ping_does_not_count_towards_ceiling() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        run_loop(
            vec![
                Ok(Message::Ping(Bytes::from(vec![0u8; 100]))),
                Ok(Message::Binary(Bytes::from(vec![1u8; 4]))),
            ],
            dispatcher.clone(),
            10,
        )
        .await;

        assert_eq!(dispatcher.frames.lock().len(), 1);
        assert!(matches!(
            dispatcher.stops.lock()[0],
            StopReason::PeerClosed(_)
        ));
    }

    #[tokio::test]
    async fn test_receive_loop_read_error_reported_once() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let state = run_loop(
            vec![
                Ok(Message::Binary(Bytes::from_static(b"a"))),
                Err(WsError::ConnectionClosed),
                Ok(Message::Binary(Bytes::from_static(b"never"))),
            ],
            dispatcher.clone(),
            1_000,
        )
        .await;

        assert_eq!(dispatcher.frames.lock().len(), 1);
        assert_eq!(dispatcher.stops.lock().len(), 1);
        assert!(matches!(
            state,
            TaskState::Stopped(StopReason::ReadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_loop_close_frame() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let state = run_loop(
            vec![Ok(Message::Close(None)), Ok(Message::Text("late".into()))],
            dispatcher.clone(),
            1_000,
        )
        .await;

        assert!(dispatcher.frames.lock().is_empty());
        assert_eq!(
            state,
            TaskState::Stopped(StopReason::PeerClosed("close frame".to_string()))
        );
    }

    #[tokio::test]
    async fn test_receive_loop_stops_when_dispatcher_lets_go() {
        let dispatcher = Arc::new(RecordingDispatcher {
            break_after: Some(1),
            ..Default::default()
        });
        let state = run_loop(
            vec![
                Ok(Message::Text("first".into())),
                Ok(Message::Text("second".into())),
            ],
            dispatcher.clone(),
            1_000,
        )
        .await;

        assert_eq!(dispatcher.frames.lock().len(), 1);
        assert_eq!(state, TaskState::Stopped(StopReason::CallerClosed));
    }

    #[tokio::test]
    async fn test_receive_loop_shutdown_token() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (state_tx, mut state_rx) = watch::channel(TaskState::Running);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(receive_loop(
            futures::stream::pending::<Result<Message, WsError>>(),
            dispatcher.clone() as Arc<dyn FrameDispatcher>,
            1_000,
            shutdown.clone(),
            state_tx,
        ));

        assert_eq!(*state_rx.borrow(), TaskState::Running);
        shutdown.cancel();
        task.await.unwrap();

        state_rx.changed().await.ok();
        assert_eq!(
            *state_rx.borrow(),
            TaskState::Stopped(StopReason::CallerClosed)
        );
        assert_eq!(*dispatcher.stops.lock(), vec![StopReason::CallerClosed]);
    }

    #[tokio::test]
    async fn test_close_stops_live_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let config = AzureTTSConfig::with_endpoint(format!("ws://{addr}/ws"));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let connection = Connection::connect(&config, "abc", dispatcher.clone())
            .await
            .unwrap();
        assert!(connection.is_alive());
        assert_eq!(connection.task_state(), TaskState::Running);

        connection.close().await;

        assert_eq!(connection.stopped().await, StopReason::CallerClosed);
        assert_eq!(
            connection.task_state(),
            TaskState::Stopped(StopReason::CallerClosed)
        );
        assert!(!connection.is_alive());
        assert_eq!(*dispatcher.stops.lock(), vec![StopReason::CallerClosed]);
    }

    #[test]
    fn test_handshake_request_headers() {
        let url = Url::parse("ws://127.0.0.1:9000/tts?X-ConnectionId=abc").unwrap();
        let request = build_handshake_request(&url).unwrap();

        let headers = request.headers();
        assert_eq!(headers["Host"], "127.0.0.1:9000");
        assert_eq!(headers["Origin"], BROWSER_ORIGIN);
        assert_eq!(headers["User-Agent"], BROWSER_USER_AGENT);
        assert_eq!(headers["Accept-Encoding"], BROWSER_ACCEPT_ENCODING);
        assert_eq!(request.uri(), "ws://127.0.0.1:9000/tts?X-ConnectionId=abc");

        let url = Url::parse("wss://eastus.api.speech.microsoft.com/ws").unwrap();
        let request = build_handshake_request(&url).unwrap();
        assert_eq!(request.headers()["Host"], "eastus.api.speech.microsoft.com");
    }
}
