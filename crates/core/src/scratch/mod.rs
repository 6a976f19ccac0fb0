//! Scratch file lifecycle: handles, sessions, and the scratch directory.
//!
//! Every intermediate artifact a request creates is reserved through a
//! [`ScratchSession`]; the session removes whatever is left when it closes,
//! whether the request succeeded or failed. The active session is carried as
//! a task-local value set by [`ScratchSession::enter`], so deep call sites
//! reserve through [`reserve`] without threading the session everywhere.

mod dir;
mod session;

pub use dir::ScratchDir;
pub use session::{ScratchSession, TempFile};

use tracing::warn;

use crate::metrics;

tokio::task_local! {
    pub(crate) static ACTIVE_SESSION: ScratchSession;
}

/// The session currently in scope, if any.
pub fn current_session() -> Option<ScratchSession> {
    ACTIVE_SESSION.try_with(|s| s.clone()).ok()
}

/// Reserves a scratch file with the active session.
///
/// When no session is in scope the reservation still succeeds, so the caller
/// is not blocked, but the handle is untracked and its file will leak; this
/// is logged loudly and counted.
pub fn reserve(extension: &str) -> TempFile {
    match current_session() {
        Some(session) => session.reserve(extension),
        None => {
            let path = dir::orphan_path(extension);
            warn!(
                "scratch file {} reserved outside of any session; it will not be cleaned up",
                path.display()
            );
            metrics::SCRATCH_ORPHANS.inc();
            TempFile::new(path, extension.to_string())
        }
    }
}
