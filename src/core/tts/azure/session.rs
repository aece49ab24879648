//! Correlation of inbound frames to pending synthesis sessions.
//!
//! Each [`Connection`](super::transport::Connection) gets its own
//! [`SessionRegistry`] as its frame dispatcher. The receive task decodes every
//! frame and routes it by `X-RequestId` to the session that sent the request.
//! Frames for unknown or already finished sessions are dropped, so a late
//! frame can never end up in the wrong call.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::codec::{InboundFrame, InboundMessage, WireFrame, decode};
use super::transport::{FrameDispatcher, StopReason};

/// What a pending session can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Audio(Bytes),
    TurnEnd,
    Failed(StopReason),
}

/// Sessions currently waiting on one connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    sessions: HashMap<String, mpsc::UnboundedSender<SessionEvent>>,
    // Set once the receive task has stopped; no frame will ever arrive after it
    stopped: Option<StopReason>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. It stays registered until the returned guard drops.
    ///
    /// Registering on a registry whose connection has already stopped yields a
    /// session whose first event is the stop reason.
    pub fn register(self: &Arc<Self>, session_id: &str) -> PendingSession {
        let id = session_id.to_ascii_lowercase();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(reason) = &inner.stopped {
            warn!("Session {} registered after the connection stopped: {}", id, reason);
            let _ = tx.send(SessionEvent::Failed(reason.clone()));
        } else if inner.sessions.insert(id.clone(), tx).is_some() {
            warn!("Session {} was already registered, replacing it", id);
        }
        drop(guard);

        PendingSession {
            id,
            events: rx,
            registry: Arc::clone(self),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Why the connection stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner.lock().stopped.clone()
    }

    fn deregister(&self, session_id: &str) {
        self.inner.lock().sessions.remove(session_id);
    }

    fn route(&self, frame: InboundFrame) {
        let event = match frame.message {
            InboundMessage::AudioChunk(data) => SessionEvent::Audio(data),
            InboundMessage::TurnEnd => SessionEvent::TurnEnd,
            InboundMessage::TurnStart => {
                debug!("Turn started for request {:?}", frame.request_id);
                return;
            }
            InboundMessage::Other { path } => {
                debug!(
                    "Ignoring {} frame for request {:?}",
                    path.as_deref().unwrap_or("unlabelled"),
                    frame.request_id
                );
                return;
            }
        };

        let inner = self.inner.lock();
        let sessions = &inner.sessions;
        let target = match frame.request_id.as_deref() {
            Some(id) => sessions.get(&id.to_ascii_lowercase()),
            // No id on the frame: only unambiguous with a single pending session
            None if sessions.len() == 1 => sessions.values().next(),
            None => None,
        };

        match target {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Session {:?} stopped listening", frame.request_id);
                }
            }
            None => debug!(
                "Dropping frame for unknown session {:?} ({} pending)",
                frame.request_id,
                sessions.len()
            ),
        }
    }
}

impl FrameDispatcher for SessionRegistry {
    fn on_frame(&self, frame: WireFrame) -> ControlFlow<()> {
        match decode(frame) {
            Ok(inbound) => self.route(inbound),
            Err(e) => warn!("Discarding malformed frame: {}", e),
        }
        ControlFlow::Continue(())
    }

    fn on_stop(&self, reason: &StopReason) {
        let mut inner = self.inner.lock();
        inner.stopped = Some(reason.clone());
        let sessions = &inner.sessions;

        if sessions.is_empty() {
            // Nobody is waiting, e.g. the connection dropped after a completed call
            info!("Connection stopped with no pending session: {}", reason);
            return;
        }

        for (id, tx) in sessions.iter() {
            error!("Session {} failed: {}", id, reason);
            let _ = tx.send(SessionEvent::Failed(reason.clone()));
        }
    }
}

/// Registration guard of one in-flight session.
#[derive(Debug)]
pub struct PendingSession {
    id: String,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    registry: Arc<SessionRegistry>,
}

impl PendingSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event routed to this session, in socket order.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        self.registry.deregister(&self.id);
    }
}
