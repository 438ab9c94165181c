use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::live::Session;
use super::watcher::{self, WatchSettings};
use crate::models::SessionInfo;
use crate::services::{MarkdownRenderer, Renderer};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("no session for '{0}'")]
    NotFound(String),
}

/// Aggregate counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub sessions: usize,
    pub subscribers: usize,
    pub active_watches: usize,
}

#[derive(Default)]
struct Sessions {
    by_path: HashMap<PathBuf, Arc<Session>>,
    by_id: HashMap<String, Arc<Session>>,
}

struct RegistryInner {
    sessions: RwLock<Sessions>,
    renderer: Arc<dyn Renderer>,
    settings: WatchSettings,
    created: AtomicU64,
    active_watches: Arc<AtomicUsize>,
}

/// Maps previewed files to their sessions.
///
/// Cloning is cheap and every clone shares the same sessions. Independent
/// registries can coexist in one process.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(MarkdownRenderer), WatchSettings::default())
    }
}

/// Session id for `path`, salted with the registry's creation counter so a
/// path re-added after removal gets a fresh id.
pub fn session_id(path: &Path, generation: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_os_str().as_encoded_bytes());
    hasher.update(generation.to_le_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// Canonicalize `path` and make sure it is a readable regular file
async fn resolve(path: &Path) -> Result<PathBuf, RegistryError> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|source| RegistryError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|source| RegistryError::Unreadable {
            path: canonical.clone(),
            source,
        })?;
    if !metadata.is_file() {
        return Err(RegistryError::NotAFile(canonical));
    }

    tokio::fs::File::open(&canonical)
        .await
        .map_err(|source| RegistryError::Unreadable {
            path: canonical.clone(),
            source,
        })?;

    Ok(canonical)
}

/// Key a previewed `path` is registered under.
///
/// A file deleted while previewed can no longer be canonicalized, so its
/// canonical directory plus file name is used instead.
pub async fn registered_path(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = tokio::fs::canonicalize(path).await {
        return Some(canonical);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match tokio::fs::canonicalize(parent).await {
        Ok(dir) => Some(dir.join(name)),
        Err(_) => std::path::absolute(path).ok(),
    }
}

impl Registry {
    pub fn new(renderer: Arc<dyn Renderer>, settings: WatchSettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(Sessions::default()),
                renderer,
                settings,
                created: AtomicU64::new(0),
                active_watches: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Register `path` for preview and return its session id.
    ///
    /// Idempotent: a path that is already previewed keeps its session. The
    /// first render happens in the background.
    pub async fn add(&self, path: impl AsRef<Path>) -> Result<String, RegistryError> {
        let canonical = resolve(path.as_ref()).await?;

        let mut sessions = self.inner.sessions.write().await;
        if let Some(existing) = sessions.by_path.get(&canonical) {
            return Ok(existing.id().to_string());
        }

        let id = self.mint_id(&canonical, &sessions);
        let session = Arc::new(Session::new(id.clone(), canonical.clone()));
        let handle = watcher::start(
            session.clone(),
            self.inner.renderer.clone(),
            self.inner.settings,
            self.inner.active_watches.clone(),
            self.evict_on_failure(id.clone()),
        )
        .map_err(|source| RegistryError::Watch {
            path: canonical.clone(),
            source,
        })?;
        session.attach_watch(handle);

        sessions.by_path.insert(canonical.clone(), session.clone());
        sessions.by_id.insert(id.clone(), session);
        info!(session = %id, path = ?canonical, "session created");
        Ok(id)
    }

    fn mint_id(&self, path: &Path, sessions: &Sessions) -> String {
        loop {
            let generation = self.inner.created.fetch_add(1, Ordering::SeqCst);
            let id = session_id(path, generation);
            if !sessions.by_id.contains_key(&id) {
                return id;
            }
        }
    }

    /// Removal hook for a watch loop whose OS watch broke
    fn evict_on_failure(&self, id: String) -> watcher::OnFailure {
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        Box::new(move || {
            let Some(inner) = registry.upgrade() else {
                return;
            };
            let registry = Registry { inner };
            // Spawned: removal joins the very loop that is reporting the failure
            tokio::spawn(async move {
                warn!(session = %id, "removing session after watch failure");
                if let Err(e) = registry.remove_id(&id).await {
                    warn!(session = %id, error = %e, "session already gone");
                }
            });
        })
    }

    /// Id of the session previewing `path`, if any. Never creates one.
    pub async fn get_id(&self, path: impl AsRef<Path>) -> Option<String> {
        let key = registered_path(path.as_ref()).await?;
        self.inner
            .sessions
            .read()
            .await
            .by_path
            .get(&key)
            .map(|s| s.id().to_string())
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.read().await.by_id.get(id).cloned()
    }

    /// Remove a session by id. Its watch is released and its subscribers
    /// closed before this returns.
    pub async fn remove_id(&self, id: &str) -> Result<(), RegistryError> {
        let session = {
            let mut sessions = self.inner.sessions.write().await;
            let session = sessions
                .by_id
                .remove(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            sessions.by_path.remove(session.path());
            session
        };

        session.close("session removed").await;
        info!(session = %id, path = ?session.path(), "session removed");
        Ok(())
    }

    /// Remove the session previewing `path`
    pub async fn remove_path(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let id = self
            .get_id(path)
            .await
            .ok_or_else(|| RegistryError::NotFound(path.display().to_string()))?;
        self.remove_id(&id).await
    }

    /// Remove every session. Returns how many were removed.
    pub async fn remove_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.by_path.clear();
            sessions.by_id.drain().map(|(_, s)| s).collect()
        };

        join_all(
            drained
                .iter()
                .map(|s| s.close("preview server shutting down")),
        )
        .await;

        let leaked = self.active_watches();
        if leaked > 0 {
            error!(count = leaked, "watches still active after removing all sessions");
        }
        info!(count = drained.len(), "all sessions removed");
        drained.len()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.sessions.read().await;
        let mut list: Vec<SessionInfo> = sessions
            .by_id
            .values()
            .map(|s| SessionInfo {
                id: s.id().to_string(),
                path: s.path().display().to_string(),
                created_at: s.created_at(),
                subscribers: s.subscriber_count(),
            })
            .collect();
        list.sort_by(|a, b| a.path.cmp(&b.path));
        list
    }

    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.inner.sessions.read().await;
        RegistryStats {
            sessions: sessions.by_id.len(),
            subscribers: sessions.by_id.values().map(|s| s.subscriber_count()).sum(),
            active_watches: self.active_watches(),
        }
    }

    /// Number of OS watches currently held by this registry's sessions
    pub fn active_watches(&self) -> usize {
        self.inner.active_watches.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SendMessage;
    use crate::services::RenderError;
    use crate::session::Subscription;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    fn registry() -> Registry {
        Registry::new(
            Arc::new(MarkdownRenderer),
            WatchSettings {
                debounce: Duration::from_millis(20),
            },
        )
    }

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Replace a file the way editors do, so the change lands as one event
    fn replace_file(path: &Path, contents: &str) {
        let tmp = path.with_extension("swap");
        std::fs::write(&tmp, contents).unwrap();
        std::fs::rename(&tmp, path).unwrap();
    }

    async fn next_message(sub: &mut Subscription) -> SendMessage {
        timeout(Duration::from_secs(5), sub.receiver.recv())
            .await
            .expect("timed out waiting for a push")
            .expect("subscription ended")
    }

    async fn wait_for_render(session: &Session) -> String {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Some(html) = session.last_rendered() {
                    return html;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for the first render")
    }

    #[test]
    fn test_session_id_is_deterministic() {
        let path = Path::new("/tmp/a.md");
        assert_eq!(session_id(path, 0), session_id(path, 0));
        assert_ne!(session_id(path, 0), session_id(path, 1));
        assert_ne!(session_id(path, 0), session_id(Path::new("/tmp/b.md"), 0));
        assert_eq!(session_id(path, 0).len(), 16);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        let id1 = registry.add(&path).await.unwrap();
        let id2 = registry.add(&path).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(registry.get_id(&path).await, Some(id1));
        assert_eq!(registry.active_watches(), 1);

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_add_resolves_equivalent_paths() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        let id1 = registry.add(&path).await.unwrap();
        let dotted = dir.path().join(".").join("a.md");
        assert_eq!(registry.add(&dotted).await.unwrap(), id1);

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_distinct_paths_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.md", "# A");
        let b = write_file(&dir, "b.md", "# B");
        let registry = registry();

        let id1 = registry.add(&a).await.unwrap();
        let id2 = registry.add(&b).await.unwrap();
        assert_ne!(id1, id2);
        assert_eq!(registry.active_watches(), 2);

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_get_id_of_unknown_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        assert_eq!(registry.get_id(&path).await, None);
        assert_eq!(registry.get_id(dir.path().join("missing.md")).await, None);
    }

    #[tokio::test]
    async fn test_add_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let registry = registry();

        let err = registry.add(dir.path().join("missing.md")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Resolve { .. }));
        assert_eq!(registry.stats().await.sessions, 0);
        assert_eq!(registry.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_add_directory_fails() {
        let dir = TempDir::new().unwrap();
        let registry = registry();

        let err = registry.add(dir.path()).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotAFile(_)));
    }

    #[tokio::test]
    async fn test_remove_releases_everything() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        let id = registry.add(&path).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();
        let mut sub = session.subscribe().unwrap();

        registry.remove_id(&id).await.unwrap();

        assert_eq!(registry.get_id(&path).await, None);
        assert!(registry.lookup(&id).await.is_none());
        assert_eq!(registry.active_watches(), 0);
        assert!(!session.is_watched());

        // Drain an initial render if it raced in, then expect the close
        loop {
            match next_message(&mut sub).await {
                SendMessage::Closed(_) => break,
                SendMessage::Render(_) => continue,
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert!(sub.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_id() {
        let registry = registry();
        let err = registry.remove_id("nope").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        registry.add(&path).await.unwrap();
        registry.remove_path(&path).await.unwrap();
        assert_eq!(registry.get_id(&path).await, None);
        assert!(registry.remove_path(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_deleted_file_is_still_found_by_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        let id = registry.add(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(registry.lookup(&id).await.is_some());
        assert_eq!(registry.get_id(&path).await, Some(id.clone()));
        registry.remove_path(&path).await.unwrap();
        assert!(registry.lookup(&id).await.is_none());
        assert_eq!(registry.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_get_id_of_empty_path() {
        let registry = registry();
        assert_eq!(registry.get_id("").await, None);
    }

    #[tokio::test]
    async fn test_watch_failure_evicts_only_that_session() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.md", "# A");
        let b = write_file(&dir, "b.md", "# B");
        let registry = registry();

        let failed = registry.add(&a).await.unwrap();
        let healthy = registry.add(&b).await.unwrap();
        assert_eq!(registry.active_watches(), 2);
        let mut sub = registry.lookup(&failed).await.unwrap().subscribe().unwrap();

        (registry.evict_on_failure(failed.clone()))();

        timeout(Duration::from_secs(5), async {
            while registry.lookup(&failed).await.is_some() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("failed session was not evicted");

        loop {
            match next_message(&mut sub).await {
                SendMessage::Closed(_) => break,
                SendMessage::Render(_) => continue,
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert_eq!(registry.get_id(&a).await, None);
        assert_eq!(registry.active_watches(), 1);

        let survivor = registry.lookup(&healthy).await.unwrap();
        assert!(survivor.is_watched());
        assert_eq!(registry.get_id(&b).await, Some(healthy));

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_readd_after_remove_gets_new_id() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        let first = registry.add(&path).await.unwrap();
        registry.remove_id(&first).await.unwrap();
        let second = registry.add(&path).await.unwrap();
        assert_ne!(first, second);

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_many_add_remove_cycles_do_not_leak_watches() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let registry = registry();

        for _ in 0..25 {
            let id = registry.add(&path).await.unwrap();
            registry.remove_id(&id).await.unwrap();
        }
        assert_eq!(registry.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_remove_all() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.md", "# A");
        let b = write_file(&dir, "b.md", "# B");
        let registry = registry();

        registry.add(&a).await.unwrap();
        registry.add(&b).await.unwrap();
        assert_eq!(registry.remove_all().await, 2);

        assert_eq!(registry.get_id(&a).await, None);
        assert_eq!(registry.get_id(&b).await, None);
        assert_eq!(registry.stats().await, RegistryStats::default());
    }

    #[tokio::test]
    async fn test_independent_registries() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# A");
        let first = registry();
        let second = registry();

        first.add(&path).await.unwrap();
        assert_eq!(second.get_id(&path).await, None);
        assert_eq!(second.active_watches(), 0);

        first.remove_all().await;
    }

    #[tokio::test]
    async fn test_initial_render_reaches_late_subscriber() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# Hello");
        let registry = registry();

        let id = registry.add(&path).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();
        let html = wait_for_render(&session).await;
        assert!(html.contains("<h1>Hello</h1>"));

        let mut sub = session.subscribe().unwrap();
        assert_eq!(next_message(&mut sub).await, SendMessage::render(html));

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_change_pushes_exactly_one_render() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# Before");
        let registry = registry();

        let id = registry.add(&path).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();
        wait_for_render(&session).await;
        let mut sub = session.subscribe().unwrap();
        let _initial = next_message(&mut sub).await;

        replace_file(&path, "# After");

        match next_message(&mut sub).await {
            SendMessage::Render(msg) => assert!(msg.html.contains("<h1>After</h1>")),
            other => panic!("unexpected message: {:?}", other),
        }
        sleep(Duration::from_millis(300)).await;
        assert!(sub.receiver.try_recv().is_err());

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_identical_rewrite_is_not_pushed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# Same");
        let registry = registry();

        let id = registry.add(&path).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();
        wait_for_render(&session).await;
        let mut sub = session.subscribe().unwrap();
        let _initial = next_message(&mut sub).await;

        replace_file(&path, "# Same");
        sleep(Duration::from_millis(300)).await;
        assert!(sub.receiver.try_recv().is_err());

        registry.remove_all().await;
    }

    #[tokio::test]
    async fn test_changes_arrive_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "start");
        let registry = registry();

        let id = registry.add(&path).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();
        wait_for_render(&session).await;
        let mut sub = session.subscribe().unwrap();
        let _initial = next_message(&mut sub).await;

        replace_file(&path, "first");
        sleep(Duration::from_millis(300)).await;
        replace_file(&path, "second");

        let a = next_message(&mut sub).await;
        let b = next_message(&mut sub).await;
        assert_eq!(a, SendMessage::render("<p>first</p>\n"));
        assert_eq!(b, SendMessage::render("<p>second</p>\n"));

        registry.remove_all().await;
    }

    /// Markdown renderer that rejects files starting with FAIL
    struct PickyRenderer;

    impl Renderer for PickyRenderer {
        fn render(&self, source: &[u8]) -> Result<String, RenderError> {
            if source.starts_with(b"FAIL") {
                std::str::from_utf8(&[0xff])?;
            }
            MarkdownRenderer.render(source)
        }
    }

    #[tokio::test]
    async fn test_render_failure_is_pushed_inline() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.md", "# Good");
        let registry = Registry::new(
            Arc::new(PickyRenderer),
            WatchSettings {
                debounce: Duration::from_millis(20),
            },
        );

        let id = registry.add(&path).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();
        let good = wait_for_render(&session).await;
        let mut sub = session.subscribe().unwrap();
        let _initial = next_message(&mut sub).await;

        replace_file(&path, "FAIL");

        match next_message(&mut sub).await {
            SendMessage::Error(msg) => assert!(msg.message.contains("UTF-8")),
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(session.last_rendered(), Some(good));
        assert!(registry.lookup(&id).await.is_some());

        // The session recovers on the next change
        replace_file(&path, "# Fixed");
        match next_message(&mut sub).await {
            SendMessage::Render(msg) => assert!(msg.html.contains("Fixed")),
            other => panic!("unexpected message: {:?}", other),
        }

        registry.remove_all().await;
    }
}
