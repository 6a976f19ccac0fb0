//! Scratch file handles and the session that cleans them up.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use super::dir::ScratchDir;
use crate::metrics;

/// A tracked reference to a scratch filesystem artifact.
///
/// Reserving a handle allocates a name; it does not create the file. The
/// owning session removes the backing file when it closes, unless the handle
/// was removed early.
#[derive(Debug, Clone)]
pub struct TempFile {
    inner: Arc<TempFileInner>,
}

#[derive(Debug)]
struct TempFileInner {
    path: PathBuf,
    extension: String,
    alive: AtomicBool,
}

impl TempFile {
    pub(crate) fn new(path: PathBuf, extension: String) -> Self {
        Self {
            inner: Arc::new(TempFileInner {
                path,
                extension,
                alive: AtomicBool::new(true),
            }),
        }
    }

    /// The reserved path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The extension the handle was reserved with.
    pub fn extension(&self) -> &str {
        &self.inner.extension
    }

    /// Whether the handle still owns its backing file.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Removes the backing file. Removing twice, or removing a handle whose
    /// file was never created, logs and continues; it never fails the
    /// request.
    pub async fn remove(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            debug!("tried to remove {}, already released", self.path().display());
            return;
        }
        match tokio::fs::remove_file(self.path()).await {
            Ok(()) => {
                metrics::SCRATCH_RELEASED.inc();
                debug!("removed {}", self.path().display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("tried to remove {}, already gone", self.path().display());
            }
            Err(e) => {
                warn!("failed to remove {}: {}", self.path().display(), e);
            }
        }
    }

    /// Synchronous removal, used by the session drop backstop.
    fn remove_blocking(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_file(self.path()) {
            Ok(()) => metrics::SCRATCH_RELEASED.inc(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {}", self.path().display(), e),
        }
    }
}

impl AsRef<Path> for TempFile {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

/// The cleanup scope bracketing one request's scratch file usage.
///
/// Every handle reserved while the session is the active scope is appended
/// to it; `close()` removes whatever is still alive, on success and error
/// paths alike. Cheap to clone; clones share the same scope.
#[derive(Debug, Clone)]
pub struct ScratchSession {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: Uuid,
    dir: Arc<ScratchDir>,
    files: Mutex<Vec<TempFile>>,
    active: AtomicBool,
}

impl ScratchSession {
    /// Opens a new session against the given scratch directory.
    pub fn open(dir: Arc<ScratchDir>) -> Self {
        let id = Uuid::new_v4();
        debug!("scratch session {id} opened");
        Self {
            inner: Arc::new(SessionInner {
                id,
                dir,
                files: Mutex::new(Vec::new()),
                active: AtomicBool::new(true),
            }),
        }
    }

    /// The session's opaque id.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub(crate) fn scratch_dir(&self) -> Arc<ScratchDir> {
        Arc::clone(&self.inner.dir)
    }

    /// Reserves a unique, not-yet-existing scratch path and registers it
    /// with this session.
    pub fn reserve(&self, extension: &str) -> TempFile {
        let path = self.inner.dir.unique_path(extension);
        debug!("reserved {}", path.display());
        let file = TempFile::new(path, extension.to_string());
        self.track(file.clone());
        metrics::SCRATCH_RESERVED.inc();
        file
    }

    /// Registers an externally named path with this session, so it is
    /// removed at close.
    pub fn adopt(&self, path: PathBuf) -> TempFile {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        debug!("adopted {}", path.display());
        let file = TempFile::new(path, extension);
        self.track(file.clone());
        file
    }

    /// Registers every path in `paths` with this session.
    pub fn adopt_all(&self, paths: Vec<PathBuf>) {
        for path in paths {
            self.adopt(path);
        }
    }

    /// Returns the handle already tracking `path`, or adopts it.
    pub fn claim(&self, path: &Path) -> TempFile {
        let existing = {
            let files = self.lock_files();
            files.iter().find(|f| f.path() == path).cloned()
        };
        match existing {
            Some(file) => file,
            None => self.adopt(path.to_path_buf()),
        }
    }

    /// Paths currently tracked by this session.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.lock_files()
            .iter()
            .map(|f| f.path().to_path_buf())
            .collect()
    }

    /// Number of handles tracked by this session.
    pub fn tracked_count(&self) -> usize {
        self.lock_files().len()
    }

    /// Whether the session has not been closed yet.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Closes the session, removing every handle still alive. Removal
    /// failures are logged at debug level, never escalated. Closing twice is
    /// a no-op.
    pub async fn close(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let files: Vec<TempFile> = {
            let guard = self.lock_files();
            guard.clone()
        };
        debug!(
            "scratch session {} closing with {} files",
            self.inner.id,
            files.len()
        );
        for file in &files {
            file.remove().await;
        }
        debug!("scratch session {} closed", self.inner.id);
    }

    /// Runs `fut` with this session as the active scope, so that
    /// [`crate::scratch::reserve`] resolves to it.
    pub async fn enter<F>(&self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        super::ACTIVE_SESSION.scope(self.clone(), fut).await
    }

    fn track(&self, file: TempFile) {
        self.lock_files().push(file);
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, Vec<TempFile>> {
        self.inner
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        // Backstop for sessions that go out of scope without close(); the
        // files must still not outlive the request.
        let files = self
            .files
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if !files.is_empty() {
            warn!(
                "scratch session {} dropped while active, releasing {} files",
                self.id,
                files.len()
            );
        }
        for file in files.iter() {
            file.remove_blocking();
        }
    }
}
