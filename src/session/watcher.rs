//! Per-session watch loop
//!
//! Watches the previewed file's directory, re-renders the file when it
//! changes and pushes the result to the session's subscribers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest as _, Sha256};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::live::{Digest, Session};
use crate::services::Renderer;

/// Default debounce window for batching file events
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Called once when the watch fails and the session must go away
pub(crate) type OnFailure = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    pub debounce: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// An OS watch, counted for as long as it is alive
struct OsWatch {
    _watcher: RecommendedWatcher,
    active: Arc<AtomicUsize>,
}

impl Drop for OsWatch {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Ownership of a session's watch: the OS watch plus the loop driving it
pub(crate) struct WatchHandle {
    os_watch: OsWatch,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the loop and release the OS watch. Returns after the loop exits.
    pub(crate) async fn stop(self) {
        let WatchHandle {
            os_watch,
            cancel,
            task,
        } = self;
        cancel.cancel();
        drop(os_watch);
        if let Err(e) = task.await {
            if e.is_panic() {
                error!(error = %e, "watch loop panicked");
            }
        }
    }
}

/// Start watching `session`'s file. The first render happens on the loop, not here.
pub(crate) fn start(
    session: Arc<Session>,
    renderer: Arc<dyn Renderer>,
    settings: WatchSettings,
    active: Arc<AtomicUsize>,
    on_failure: OnFailure,
) -> Result<WatchHandle, notify::Error> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = event_tx.send(res);
    })?;

    // Watch the directory so replace-by-rename saves are still seen
    let path = session.path();
    let dir = path.parent().unwrap_or(path);
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    active.fetch_add(1, Ordering::SeqCst);
    let os_watch = OsWatch {
        _watcher: watcher,
        active,
    };

    info!(session = %session.id(), path = ?session.path(), "watching file");

    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(
        session,
        renderer,
        settings.debounce,
        event_rx,
        cancel.clone(),
        on_failure,
    ));

    Ok(WatchHandle {
        os_watch,
        cancel,
        task,
    })
}

/// Whether a notify event concerns the watched file
fn touches(event: &Event, path: &Path) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|p| p == path)
}

async fn run(
    session: Arc<Session>,
    renderer: Arc<dyn Renderer>,
    debounce: Duration,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    cancel: CancellationToken,
    on_failure: OnFailure,
) {
    refresh(&session, renderer.as_ref()).await;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = events.recv() => next,
        };

        match next {
            Some(Ok(event)) => {
                if !touches(&event, session.path()) {
                    continue;
                }
            }
            Some(Err(e)) => {
                error!(session = %session.id(), error = %e, "file watch failed");
                on_failure();
                return;
            }
            None => {
                if !cancel.is_cancelled() {
                    error!(session = %session.id(), "file watch channel closed");
                    on_failure();
                }
                return;
            }
        }

        // Let a burst of writes settle, then fold it into one render
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(debounce) => {}
        }
        loop {
            match events.try_recv() {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    error!(session = %session.id(), error = %e, "file watch failed");
                    on_failure();
                    return;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        refresh(&session, renderer.as_ref()).await;
    }

    debug!(session = %session.id(), "watch loop stopped");
}

/// Read the file, render it if its content changed and push the outcome
async fn refresh(session: &Session, renderer: &dyn Renderer) {
    let bytes = match tokio::fs::read(session.path()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(session = %session.id(), path = ?session.path(), error = %e, "cannot read file");
            session.forget_content();
            session.publish_error(format!(
                "cannot read {}: {}",
                session.path().display(),
                e
            ));
            return;
        }
    };

    let digest: Digest = Sha256::digest(&bytes).into();
    if !session.content_changed(digest) {
        debug!(session = %session.id(), "content unchanged, skipping render");
        return;
    }

    match renderer.render(&bytes) {
        Ok(html) => session.publish_render(html),
        Err(e) => {
            warn!(session = %session.id(), error = %e, "render failed");
            session.publish_error(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RenameMode};
    use std::path::PathBuf;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        Event {
            kind,
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_touches_modify_of_watched_file() {
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            &["/tmp/docs/a.md"],
        );
        assert!(touches(&ev, Path::new("/tmp/docs/a.md")));
        assert!(!touches(&ev, Path::new("/tmp/docs/b.md")));
    }

    #[test]
    fn test_touches_rename_onto_watched_file() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/tmp/docs/.a.md.swp", "/tmp/docs/a.md"],
        );
        assert!(touches(&ev, Path::new("/tmp/docs/a.md")));
    }

    #[test]
    fn test_touches_create() {
        let ev = event(EventKind::Create(CreateKind::File), &["/tmp/docs/a.md"]);
        assert!(touches(&ev, Path::new("/tmp/docs/a.md")));
    }

    #[test]
    fn test_ignores_access() {
        let ev = event(EventKind::Access(AccessKind::Any), &["/tmp/docs/a.md"]);
        assert!(!touches(&ev, Path::new("/tmp/docs/a.md")));
    }
}
