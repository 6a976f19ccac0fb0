//! CPU-bound work on a dedicated blocking thread, with scratch merge-back.
//!
//! Heavy synchronous steps cannot run on the cooperative scheduler, and the
//! task-local session scope does not cross thread boundaries. Each call gets
//! a fresh blocking task and an empty [`WorkerScope`]; when the worker
//! finishes, everything it reserved is merged back into the caller's
//! session, even when the worker failed, so that partially created files
//! are still cleaned up.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::ProcessingError;
use crate::scratch::{ScratchDir, ScratchSession};

/// Per-worker reservation list; the synchronous counterpart of
/// [`crate::scratch::reserve`].
#[derive(Debug)]
pub struct WorkerScope {
    dir: Arc<ScratchDir>,
    reserved: Mutex<Vec<PathBuf>>,
}

impl WorkerScope {
    fn new(dir: Arc<ScratchDir>) -> Self {
        Self {
            dir,
            reserved: Mutex::new(Vec::new()),
        }
    }

    /// Reserves a unique scratch path, recorded for merge-back.
    pub fn reserve(&self, extension: &str) -> PathBuf {
        let path = self.dir.unique_path(extension);
        debug!("worker reserved {}", path.display());
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.clone());
        path
    }

    fn into_reserved(self) -> Vec<PathBuf> {
        self.reserved
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a worker hands back: its outcome plus every path it reserved.
struct WorkerReport<T> {
    outcome: Result<T, ProcessingError>,
    reserved: Vec<PathBuf>,
}

/// Runs `job` on a fresh blocking thread and merges its reservations back
/// into `session`.
///
/// The merge happens before the outcome is inspected: a worker that reserved
/// three files and then failed still leaves all three scheduled for cleanup,
/// and its error is re-raised here.
pub async fn run_isolated<T, F>(
    session: &ScratchSession,
    job: F,
) -> Result<T, ProcessingError>
where
    T: Send + 'static,
    F: FnOnce(&WorkerScope) -> Result<T, ProcessingError> + Send + 'static,
{
    let scope = WorkerScope::new(session.scratch_dir());
    let report = tokio::task::spawn_blocking(move || {
        let outcome = job(&scope);
        WorkerReport {
            outcome,
            reserved: scope.into_reserved(),
        }
    })
    .await
    .map_err(|e| ProcessingError::internal(format!("isolated worker did not finish: {e}")))?;

    if !report.reserved.is_empty() {
        debug!("merging {} worker reservations", report.reserved.len());
    }
    session.adopt_all(report.reserved);
    report.outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScratchConfig;
    use tempfile::TempDir;

    fn session_in(tmp: &TempDir) -> ScratchSession {
        ScratchSession::open(Arc::new(
            ScratchDir::init(&ScratchConfig {
                dir: Some(tmp.path().join("scratch")),
            })
            .unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_result_and_reservations_come_back() {
        let tmp = TempDir::new().unwrap();
        let session = session_in(&tmp);

        let result = run_isolated(&session, |scope| {
            let out = scope.reserve("png");
            std::fs::write(&out, b"frame").map_err(ProcessingError::from)?;
            Ok(out)
        })
        .await
        .unwrap();

        assert!(result.exists());
        assert_eq!(session.tracked_paths(), vec![result.clone()]);

        session.close().await;
        assert!(!result.exists());
    }

    #[tokio::test]
    async fn test_failed_worker_still_merges_reservations() {
        let tmp = TempDir::new().unwrap();
        let session = session_in(&tmp);

        let result: Result<(), _> = run_isolated(&session, |scope| {
            for _ in 0..3 {
                let path = scope.reserve("png");
                std::fs::write(&path, b"partial").map_err(ProcessingError::from)?;
            }
            Err(ProcessingError::internal("render blew up"))
        })
        .await;

        // the error is re-raised...
        assert!(matches!(result, Err(ProcessingError::Internal(_))));
        // ...and all three partial files are scheduled for cleanup
        let tracked = session.tracked_paths();
        assert_eq!(tracked.len(), 3);
        for path in &tracked {
            assert!(path.exists());
        }

        session.close().await;
        for path in &tracked {
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_worker_with_no_reservations() {
        let tmp = TempDir::new().unwrap();
        let session = session_in(&tmp);

        let n = run_isolated(&session, |_scope| Ok(7)).await.unwrap();
        assert_eq!(n, 7);
        assert_eq!(session.tracked_count(), 0);
        session.close().await;
    }
}
