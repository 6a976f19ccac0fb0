//! Process-wide scratch directory for intermediate media files.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::config::ScratchConfig;

/// The writable directory every scratch file lives under.
///
/// Created fresh at process start: anything left over from a previous run is
/// cleared, since stale files from a crashed process cannot be trusted.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Initializes the scratch directory, clearing any pre-existing contents.
    pub fn init(config: &ScratchConfig) -> io::Result<Self> {
        let root = Self::resolve_root(config);
        if root.is_dir() {
            std::fs::remove_dir_all(&root)?;
        }
        std::fs::create_dir_all(&root)?;
        debug!("scratch dir is {}", root.display());
        Ok(Self { root })
    }

    /// Picks the scratch location: the configured override, else an
    /// in-memory filesystem when one exists, else the OS temp directory.
    fn resolve_root(config: &ScratchConfig) -> PathBuf {
        if let Some(dir) = &config.dir {
            return dir.clone();
        }
        let shm = Path::new("/dev/shm");
        if shm.is_dir() {
            shm.join("mediapress")
        } else {
            std::env::temp_dir().join("mediapress")
        }
    }

    /// Returns the scratch root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a unique, not-yet-existing path under the scratch root.
    ///
    /// An empty extension yields a bare name, used for artifacts that get
    /// suffixes appended by external tools.
    pub fn unique_path(&self, extension: &str) -> PathBuf {
        loop {
            let stem = random_stem();
            let name = if extension.is_empty() {
                stem
            } else {
                format!("{}.{}", stem, extension)
            };
            let path = self.root.join(name);
            if !path.exists() {
                return path;
            }
        }
    }
}

/// Allocates a unique path under the OS temp directory, for reservations
/// made with no session in scope.
pub(crate) fn orphan_path(extension: &str) -> PathBuf {
    let stem = random_stem();
    let name = if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension)
    };
    std::env::temp_dir().join(name)
}

fn random_stem() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
