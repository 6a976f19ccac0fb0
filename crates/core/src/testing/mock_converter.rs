//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::converter::{Converter, MediaInfo, MediaKind};
use crate::error::ProcessingError;
use crate::scratch::{self, TempFile};

/// A recorded converter operation, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Resize { width: u32, height: u32 },
    ChangeFps { fps: f64 },
    Trim { duration_secs: f64 },
    EncodeCapped {
        video_bitrate_bps: u64,
        audio_bitrate_bps: u64,
    },
}

type ProbeFn = Box<dyn Fn(&Path) -> MediaInfo + Send + Sync>;

/// Mock implementation of the [`Converter`] trait.
///
/// Probe results can be scripted per path or per extension; each produced
/// artifact is a real file written with the next scripted size, so callers
/// that measure outputs on disk see exactly what the script says.
#[derive(Clone)]
pub struct MockConverter {
    ops: Arc<RwLock<Vec<RecordedOp>>>,
    probes: Arc<AtomicUsize>,
    probe_by_path: Arc<RwLock<HashMap<PathBuf, MediaInfo>>>,
    probe_by_extension: Arc<RwLock<HashMap<String, ProbeFn>>>,
    output_sizes: Arc<RwLock<VecDeque<u64>>>,
    next_error: Arc<RwLock<Option<ProcessingError>>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            ops: Arc::new(RwLock::new(Vec::new())),
            probes: Arc::new(AtomicUsize::new(0)),
            probe_by_path: Arc::new(RwLock::new(HashMap::new())),
            probe_by_extension: Arc::new(RwLock::new(HashMap::new())),
            output_sizes: Arc::new(RwLock::new(VecDeque::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// All operations performed so far, in order.
    pub async fn recorded_ops(&self) -> Vec<RecordedOp> {
        self.ops.read().await.clone()
    }

    /// Number of transforming operations performed (probes not included).
    pub async fn op_count(&self) -> usize {
        self.ops.read().await.len()
    }

    /// Number of probes performed.
    pub async fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Scripts the probe result for one exact path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.probe_by_path
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Scripts probe results for every file with the given extension; the
    /// callback receives the probed path.
    pub async fn set_default_probe_for<F>(&self, extension: &str, f: F)
    where
        F: Fn(&Path) -> MediaInfo + Send + Sync + 'static,
    {
        self.probe_by_extension
            .write()
            .await
            .insert(extension.to_string(), Box::new(f));
    }

    /// Scripts the byte sizes of successive produced artifacts. When the
    /// script runs out, the last size keeps repeating.
    pub async fn set_output_sizes(&self, sizes: Vec<u64>) {
        *self.output_sizes.write().await = sizes.into();
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ProcessingError) {
        *self.next_error.write().await = Some(error);
    }

    async fn take_error(&self) -> Option<ProcessingError> {
        self.next_error.write().await.take()
    }

    async fn next_output_size(&self) -> u64 {
        let mut sizes = self.output_sizes.write().await;
        match sizes.len() {
            0 => 1024,
            1 => sizes[0],
            _ => sizes.pop_front().unwrap_or(1024),
        }
    }

    async fn produce(&self, extension: &str, op: RecordedOp) -> Result<TempFile, ProcessingError> {
        if let Some(err) = self.take_error().await {
            self.ops.write().await.push(op);
            return Err(err);
        }
        self.ops.write().await.push(op);

        let out = scratch::reserve(extension);
        let size = self.next_output_size().await;
        tokio::fs::write(out.path(), vec![0u8; size as usize]).await?;
        Ok(out)
    }

    /// Default probe info when nothing is scripted, derived from the
    /// extension the way real media usually looks.
    fn default_info(path: &Path) -> MediaInfo {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(1024);

        let (kind, width, height, duration_secs, fps) = match extension.as_str() {
            "mp4" | "mkv" | "webm" | "mov" | "avi" => {
                (MediaKind::Video, Some(1280), Some(720), Some(10.0), Some(30.0))
            }
            "gif" => (MediaKind::Gif, Some(480), Some(480), Some(2.0), Some(10.0)),
            "mp3" | "m4a" | "wav" | "ogg" | "flac" => {
                (MediaKind::Audio, None, None, Some(60.0), None)
            }
            _ => (MediaKind::Image, Some(1000), Some(1000), None, None),
        };

        MediaInfo {
            path: path.to_path_buf(),
            kind,
            size_bytes,
            format: extension,
            duration_secs,
            width,
            height,
            fps,
        }
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProcessingError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.probes.fetch_add(1, Ordering::SeqCst);

        if let Some(info) = self.probe_by_path.read().await.get(path) {
            return Ok(info.clone());
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if let Some(f) = self.probe_by_extension.read().await.get(&extension) {
            return Ok(f(path));
        }

        Ok(Self::default_info(path))
    }

    async fn resize(
        &self,
        input: &Path,
        width: u32,
        height: u32,
    ) -> Result<TempFile, ProcessingError> {
        let extension = input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_string();
        self.produce(&extension, RecordedOp::Resize { width, height })
            .await
    }

    async fn change_fps(&self, _input: &Path, fps: f64) -> Result<TempFile, ProcessingError> {
        self.produce("mp4", RecordedOp::ChangeFps { fps }).await
    }

    async fn trim(&self, _input: &Path, duration_secs: f64) -> Result<TempFile, ProcessingError> {
        self.produce("mp4", RecordedOp::Trim { duration_secs }).await
    }

    async fn encode_capped(
        &self,
        _input: &Path,
        video_bitrate_bps: u64,
        audio_bitrate_bps: u64,
    ) -> Result<TempFile, ProcessingError> {
        self.produce(
            "mp4",
            RecordedOp::EncodeCapped {
                video_bitrate_bps,
                audio_bitrate_bps,
            },
        )
        .await
    }

    async fn validate(&self) -> Result<(), ProcessingError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}
