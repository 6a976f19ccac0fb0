//! Shrinks result artifacts until they fit the platform upload limit.
//!
//! Two strategies, picked by media kind: a two-pass bitrate search for video
//! and a resolution search for images and gifs. Both walk the same
//! descending tolerance ladder and accept the first artifact under the
//! limit; exhausting the ladder is a terminal, user-facing failure. The loop
//! never hands back an oversized artifact silently.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::LimitsConfig;
use crate::converter::Converter;
use crate::error::ProcessingError;
use crate::metrics;
use crate::scratch::TempFile;

/// Safety margins applied to the computed target, most optimistic first.
pub const TOLERANCE_LADDER: [f64; 7] = [0.98, 0.95, 0.90, 0.75, 0.50, 0.25, 0.10];

/// Iterative search that shrinks an artifact to satisfy the byte budget.
pub struct SizeFitter<C> {
    converter: Arc<C>,
    limits: LimitsConfig,
}

impl<C: Converter> SizeFitter<C> {
    /// Creates a fitter over the given converter and limits.
    pub fn new(converter: Arc<C>, limits: LimitsConfig) -> Self {
        Self { converter, limits }
    }

    /// Returns `media` if it already fits, a shrunk replacement if one can
    /// be produced, or a terminal error. Results over the hard ceiling are
    /// rejected outright, before any codec work.
    pub async fn fit(&self, media: TempFile) -> Result<TempFile, ProcessingError> {
        let size = file_size(media.path()).await?;

        if size > self.limits.way_too_big_bytes {
            metrics::SIZE_FITS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(ProcessingError::user_facing(format!(
                "resulting file is {}; refusing to process anything over {}",
                format_bytes(size),
                format_bytes(self.limits.way_too_big_bytes)
            )));
        }

        if size < self.limits.file_upload_limit_bytes {
            metrics::SIZE_FITS_TOTAL.with_label_values(&["untouched"]).inc();
            return Ok(media);
        }

        let info = self.converter.probe(media.path()).await?;
        info!(
            "result is {} which is over the {} limit, downsizing",
            format_bytes(size),
            format_bytes(self.limits.file_upload_limit_bytes)
        );

        let fitted = match info.kind {
            crate::converter::MediaKind::Video => {
                let duration = info
                    .duration_secs
                    .ok_or_else(|| ProcessingError::probe_failed("video has no duration"))?;
                self.cap_video(media.path(), size, duration).await
            }
            crate::converter::MediaKind::Image | crate::converter::MediaKind::Gif => {
                let (width, height) = info
                    .dimensions()
                    .ok_or_else(|| ProcessingError::probe_failed("media has no dimensions"))?;
                self.downsize_visual(media.path(), size, width, height).await
            }
            _ => Err(ProcessingError::user_facing(
                "file is too big to upload".to_string(),
            )),
        };

        metrics::SIZE_FITS_TOTAL
            .with_label_values(&[if fitted.is_ok() { "fitted" } else { "failed" }])
            .inc();
        fitted
    }

    /// Forces a video under the limit with two-pass encoding at descending
    /// bitrate targets.
    async fn cap_video(
        &self,
        input: &Path,
        size: u64,
        duration_secs: f64,
    ) -> Result<TempFile, ProcessingError> {
        let max_bytes = self.limits.file_upload_limit_bytes;
        let audio_bps = self.limits.audio_bitrate_bps;
        // bytes to bits
        let target_total_bps = (max_bytes * 8) as f64 / duration_secs;

        for (round, tolerance) in TOLERANCE_LADDER.iter().enumerate() {
            let video_bps = (target_total_bps - audio_bps as f64) * tolerance;
            if video_bps <= 0.0 {
                return Err(ProcessingError::user_facing(format!(
                    "cannot fit this video within {}",
                    format_bytes(max_bytes)
                )));
            }

            info!(
                "trying to force {} ({}) under {} with tolerance {}, targeting {}/s",
                input.display(),
                format_bytes(size),
                format_bytes(max_bytes),
                tolerance,
                format_bytes((video_bps / 8.0) as u64)
            );
            let out = self
                .converter
                .encode_capped(input, video_bps as u64, audio_bps)
                .await?;
            let out_size = file_size(out.path()).await?;
            if out_size < max_bytes {
                info!("successfully created {} video", format_bytes(out_size));
                metrics::FIT_ROUNDS.observe((round + 1) as f64);
                return Ok(out);
            }
            info!(
                "tolerance {} failed, output is {}",
                tolerance,
                format_bytes(out_size)
            );
        }

        metrics::FIT_ROUNDS.observe(TOLERANCE_LADDER.len() as f64);
        Err(ProcessingError::user_facing(format!(
            "unable to fit {} within {}",
            input.display(),
            format_bytes(max_bytes)
        )))
    }

    /// Shrinks an image or gif by reducing its resolution; file size is
    /// roughly proportional to the pixel count, so the area is scaled by the
    /// byte ratio while the aspect ratio is preserved.
    async fn downsize_visual(
        &self,
        input: &Path,
        size: u64,
        width: u32,
        height: u32,
    ) -> Result<TempFile, ProcessingError> {
        let max_bytes = self.limits.file_upload_limit_bytes;

        for (round, tolerance) in TOLERANCE_LADDER.iter().enumerate() {
            let ratio = (max_bytes as f64 / size as f64) * tolerance;
            let new_width = (ratio * (width as f64).powi(2)).sqrt().floor() as u32;
            let new_height = (ratio * (height as f64).powi(2)).sqrt().floor() as u32;
            if new_width == 0 || new_height == 0 {
                return Err(ProcessingError::user_facing(format!(
                    "cannot fit this media within {}",
                    format_bytes(max_bytes)
                )));
            }

            info!(
                "trying to resize from {}x{} to {}x{} (~{:.3} reduction)",
                width, height, new_width, new_height, ratio
            );
            let out = self.converter.resize(input, new_width, new_height).await?;
            let out_size = file_size(out.path()).await?;
            if out_size < max_bytes {
                info!("successfully created {} media", format_bytes(out_size));
                metrics::FIT_ROUNDS.observe((round + 1) as f64);
                return Ok(out);
            }
            info!(
                "tolerance {} failed, output is {}",
                tolerance,
                format_bytes(out_size)
            );
        }

        metrics::FIT_ROUNDS.observe(TOLERANCE_LADDER.len() as f64);
        Err(ProcessingError::user_facing(format!(
            "unable to fit {} within {}",
            input.display(),
            format_bytes(max_bytes)
        )))
    }
}

async fn file_size(path: &Path) -> Result<u64, ProcessingError> {
    Ok(tokio::fs::metadata(path).await?.len())
}

/// Human-readable byte count for log lines and user messages.
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
