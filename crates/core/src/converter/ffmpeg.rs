//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use std::path::Path;

use tracing::debug;

use super::config::FfmpegConfig;
use super::invoke::run_command;
use super::probe::{parse_probe_output, MediaInfo, MediaKind};
use super::traits::Converter;
use crate::error::ProcessingError;
use crate::scratch::{self, TempFile};

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: FfmpegConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(FfmpegConfig::default())
    }

    /// Log level and extra arguments appended to every ffmpeg invocation.
    fn tail_args(&self) -> Vec<String> {
        let mut args = vec!["-loglevel".to_string(), self.config.log_level.clone()];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    /// Builds ffmpeg arguments for rescaling, per media kind.
    fn build_resize_args(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
        kind: MediaKind,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        match kind {
            MediaKind::Gif => {
                // gif output needs a palette pass to not look terrible
                args.extend([
                    "-filter_complex".to_string(),
                    format!(
                        "scale={width}:{height}:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"
                    ),
                ]);
            }
            MediaKind::Image => {
                args.extend([
                    "-vf".to_string(),
                    format!("scale={width}:{height}:flags=lanczos"),
                    "-frames:v".to_string(),
                    "1".to_string(),
                ]);
            }
            _ => {
                args.extend([
                    "-vf".to_string(),
                    format!("scale={width}:{height}:flags=lanczos,setsar=1:1"),
                    "-c:v".to_string(),
                    "libx264".to_string(),
                    "-pix_fmt".to_string(),
                    "yuv420p".to_string(),
                    "-c:a".to_string(),
                    "copy".to_string(),
                ]);
            }
        }

        args.extend(self.tail_args());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Builds ffmpeg arguments for a frame rate change.
    fn build_change_fps_args(&self, input: &Path, output: &Path, fps: f64) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-r".to_string(),
            fps.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
        ];
        args.extend(self.tail_args());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Builds ffmpeg arguments for trimming to a duration.
    fn build_trim_args(&self, input: &Path, output: &Path, duration_secs: f64) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-t".to_string(),
            duration_secs.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
        ];
        args.extend(self.tail_args());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// First pass of a two-pass bitrate-targeted encode; analysis only, no
    /// usable output.
    fn build_pass1_args(&self, input: &Path, video_bitrate_bps: u64, passlog: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "h264".to_string(),
            "-b:v".to_string(),
            video_bitrate_bps.to_string(),
            "-pass".to_string(),
            "1".to_string(),
            "-passlogfile".to_string(),
            passlog.to_string_lossy().to_string(),
            "-an".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
        ];
        args.extend(self.tail_args());
        args.push(null_device().to_string());
        args
    }

    /// Second pass producing the actual capped output.
    fn build_pass2_args(
        &self,
        input: &Path,
        output: &Path,
        video_bitrate_bps: u64,
        audio_bitrate_bps: u64,
        passlog: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "h264".to_string(),
            "-b:v".to_string(),
            video_bitrate_bps.to_string(),
            "-pass".to_string(),
            "2".to_string(),
            "-passlogfile".to_string(),
            passlog.to_string_lossy().to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            audio_bitrate_bps.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
        ];
        args.extend(self.tail_args());
        args.push(output.to_string_lossy().to_string());
        args
    }

    async fn run_ffmpeg(&self, args: Vec<String>) -> Result<(), ProcessingError> {
        run_command(&self.config.ffmpeg_path, &args, self.config.timeout_secs).await?;
        Ok(())
    }
}

fn null_device() -> &'static str {
    if cfg!(target_os = "windows") {
        "NUL"
    } else {
        "/dev/null"
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProcessingError> {
        if !path.exists() {
            return Err(ProcessingError::probe_failed(format!(
                "input file not found: {}",
                path.display()
            )));
        }

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            "-count_packets".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = run_command(&self.config.ffprobe_path, &args, self.config.timeout_secs).await?;

        let mut info = parse_probe_output(path, &output)?;
        if info.size_bytes == 0 {
            info.size_bytes = tokio::fs::metadata(path).await?.len();
        }
        debug!(
            "{} probed as {} ({} bytes)",
            path.display(),
            info.kind,
            info.size_bytes
        );
        Ok(info)
    }

    async fn resize(
        &self,
        input: &Path,
        width: u32,
        height: u32,
    ) -> Result<TempFile, ProcessingError> {
        let kind = self.probe(input).await?.kind;
        let out = scratch::reserve(kind.default_extension());
        let args = self.build_resize_args(input, out.path(), width, height, kind);
        self.run_ffmpeg(args).await?;
        Ok(out)
    }

    async fn change_fps(&self, input: &Path, fps: f64) -> Result<TempFile, ProcessingError> {
        let out = scratch::reserve("mp4");
        let args = self.build_change_fps_args(input, out.path(), fps);
        self.run_ffmpeg(args).await?;
        Ok(out)
    }

    async fn trim(&self, input: &Path, duration_secs: f64) -> Result<TempFile, ProcessingError> {
        let out = scratch::reserve("mp4");
        let args = self.build_trim_args(input, out.path(), duration_secs);
        self.run_ffmpeg(args).await?;
        Ok(out)
    }

    async fn encode_capped(
        &self,
        input: &Path,
        video_bitrate_bps: u64,
        audio_bitrate_bps: u64,
    ) -> Result<TempFile, ProcessingError> {
        // the passlog base never exists itself; ffmpeg writes suffixed files
        // next to it, which are adopted below so they are cleaned up too
        let passlog = scratch::reserve("");
        let out = scratch::reserve("mp4");

        let pass1 = self.build_pass1_args(input, video_bitrate_bps, passlog.path());
        self.run_ffmpeg(pass1).await?;
        let pass2 = self.build_pass2_args(
            input,
            out.path(),
            video_bitrate_bps,
            audio_bitrate_bps,
            passlog.path(),
        );
        let result = self.run_ffmpeg(pass2).await;

        if let Some(session) = scratch::current_session() {
            let base = passlog.path().to_string_lossy().to_string();
            session.adopt(format!("{base}-0.log").into());
            session.adopt(format!("{base}-0.log.mbtree").into());
        }

        result?;
        Ok(out)
    }

    async fn validate(&self) -> Result<(), ProcessingError> {
        run_command(
            &self.config.ffmpeg_path,
            &["-version".to_string()],
            self.config.timeout_secs,
        )
        .await?;
        run_command(
            &self.config.ffprobe_path,
            &["-version".to_string()],
            self.config.timeout_secs,
        )
        .await?;
        Ok(())
    }
}
