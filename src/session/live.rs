use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::watcher::WatchHandle;
use crate::models::SendMessage;

/// SHA-256 of the last bytes read from disk
pub(crate) type Digest = [u8; 32];

#[derive(Default)]
struct SessionState {
    last_rendered: Option<String>,
    last_digest: Option<Digest>,
    subscribers: HashMap<Uuid, mpsc::UnboundedSender<SendMessage>>,
    closed: bool,
}

/// One file under preview.
///
/// Render state and the subscriber set share a lock, so a subscriber that
/// joins always sees the current render before any later push, and a push can
/// never race with `close`.
pub struct Session {
    id: String,
    path: PathBuf,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    watch: Mutex<Option<WatchHandle>>,
}

/// A live-update connection's end of its session.
///
/// The receiver yields every push in render order, and ends after a
/// `closed` message once the session is torn down.
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::UnboundedReceiver<SendMessage>,
}

impl Session {
    pub(crate) fn new(id: String, path: PathBuf) -> Self {
        Self {
            id,
            path,
            created_at: Utc::now(),
            state: Mutex::new(SessionState::default()),
            watch: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn last_rendered(&self) -> Option<String> {
        self.state().last_rendered.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Join the session. Returns `None` once the session has been closed.
    pub fn subscribe(&self) -> Option<Subscription> {
        let mut state = self.state();
        if state.closed {
            return None;
        }

        let (tx, receiver) = mpsc::unbounded_channel();
        if let Some(html) = &state.last_rendered {
            // Cannot fail: the receiver is still in hand
            let _ = tx.send(SendMessage::render(html.clone()));
        }

        let id = Uuid::new_v4();
        state.subscribers.insert(id, tx);
        debug!(session = %self.id, subscriber = %id, "subscriber joined");
        Some(Subscription { id, receiver })
    }

    pub fn unsubscribe(&self, subscriber: Uuid) {
        if self.state().subscribers.remove(&subscriber).is_some() {
            debug!(session = %self.id, subscriber = %subscriber, "subscriber left");
        }
    }

    /// Whether `digest` differs from the last content seen. Records it either way.
    pub(crate) fn content_changed(&self, digest: Digest) -> bool {
        let mut state = self.state();
        let changed = state.last_digest != Some(digest);
        state.last_digest = Some(digest);
        changed
    }

    /// Drop the recorded digest so the next successful read renders again
    pub(crate) fn forget_content(&self) {
        self.state().last_digest = None;
    }

    /// Store a successful render and push it to every subscriber
    pub(crate) fn publish_render(&self, html: String) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.last_rendered = Some(html.clone());
        Self::fan_out(&self.id, &mut state, SendMessage::render(html));
    }

    /// Push an inline error; the previous render is kept for new subscribers
    pub(crate) fn publish_error(&self, message: String) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        Self::fan_out(&self.id, &mut state, SendMessage::error(message));
    }

    fn fan_out(id: &str, state: &mut SessionState, message: SendMessage) {
        // A failed send means the connection is gone but has not yet unsubscribed
        state
            .subscribers
            .retain(|_, tx| tx.send(message.clone()).is_ok());
        debug!(session = %id, subscribers = state.subscribers.len(), "pushed update");
    }

    pub(crate) fn attach_watch(&self, handle: WatchHandle) {
        let mut slot = self.watch.lock().unwrap_or_else(|e| e.into_inner());
        if slot.replace(handle).is_some() {
            warn!(session = %self.id, "replaced an existing watch");
        }
    }

    pub fn is_watched(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Tear the session down: stop the watch loop, release the OS watch and
    /// send every subscriber a terminal `closed` message.
    ///
    /// Returns once the watch loop has exited.
    pub(crate) async fn close(&self, reason: &str) {
        let handle = self
            .watch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.stop().await;
        }

        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        for (_, tx) in state.subscribers.drain() {
            let _ = tx.send(SendMessage::closed(reason));
        }
        debug!(session = %self.id, reason, "session closed");
    }
}
