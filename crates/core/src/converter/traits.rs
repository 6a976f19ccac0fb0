//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::probe::MediaInfo;
use crate::error::ProcessingError;
use crate::scratch::TempFile;

/// The operations the pipeline needs from a media codec engine.
///
/// Implementations reserve their outputs through the active scratch session
/// (see [`crate::scratch::reserve`]), so everything they produce is cleaned
/// up with the request.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Probes a media file for kind, dimensions, duration and frame rate.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProcessingError>;

    /// Rescales media to exactly `width` x `height`.
    async fn resize(
        &self,
        input: &Path,
        width: u32,
        height: u32,
    ) -> Result<TempFile, ProcessingError>;

    /// Re-times video to the given frame rate.
    async fn change_fps(&self, input: &Path, fps: f64) -> Result<TempFile, ProcessingError>;

    /// Cuts video down to the first `duration_secs` seconds.
    async fn trim(&self, input: &Path, duration_secs: f64) -> Result<TempFile, ProcessingError>;

    /// Two-pass encode targeting the given video bitrate, used to force a
    /// video under a byte budget.
    async fn encode_capped(
        &self,
        input: &Path,
        video_bitrate_bps: u64,
        audio_bitrate_bps: u64,
    ) -> Result<TempFile, ProcessingError>;

    /// Validates that the converter is properly configured and ready.
    async fn validate(&self) -> Result<(), ProcessingError>;
}
