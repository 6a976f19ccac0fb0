//! Media kind detection and stream info parsing.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ProcessingError;

/// Basic kind of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Gif,
    Image,
    Audio,
}

impl MediaKind {
    /// Lowercase label, used in messages and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Gif => "gif",
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    /// The container extension results of this kind are written with.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Gif => "gif",
            Self::Image => "png",
            Self::Audio => "m4a",
        }
    }

    /// Whether the kind has pixel dimensions.
    pub fn is_visual(&self) -> bool {
        !matches!(self, Self::Audio)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probed facts about a media file.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub size_bytes: u64,
    pub format: String,
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

impl MediaInfo {
    /// Width and height together, when both are known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_read_packets: Option<String>,
}

/// Parses ffprobe JSON (`-show_format -show_streams -count_packets`) into
/// [`MediaInfo`], classifying the media kind from the stream layout.
pub(crate) fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, ProcessingError> {
    let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
        ProcessingError::probe_failed(format!("unparseable ffprobe output: {e}"))
    })?;

    let duration_secs = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    let size_bytes = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let format_name = probe
        .format
        .format_name
        .split(',')
        .next()
        .unwrap_or("unknown")
        .to_string();

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    let kind = match video_stream {
        Some(stream) => {
            let packets = stream
                .nb_read_packets
                .as_deref()
                .and_then(|p| p.parse::<u64>().ok());
            let is_gif = stream.codec_name.as_deref() == Some("gif") || format_name == "gif";
            if is_gif {
                // single-frame gifs are easier to treat like stills
                if packets == Some(1) {
                    MediaKind::Image
                } else {
                    MediaKind::Gif
                }
            } else if packets == Some(1) {
                MediaKind::Image
            } else {
                MediaKind::Video
            }
        }
        None => {
            if audio_stream.is_some() {
                MediaKind::Audio
            } else {
                return Err(ProcessingError::probe_failed(format!(
                    "{} has no audio or video streams",
                    path.display()
                )));
            }
        }
    };

    Ok(MediaInfo {
        path: path.to_path_buf(),
        kind,
        size_bytes,
        format: format_name,
        duration_secs,
        width: video_stream.and_then(|s| s.width),
        height: video_stream.and_then(|s| s.height),
        fps: video_stream
            .and_then(|s| s.r_frame_rate.as_deref())
            .and_then(parse_frame_rate),
    })
}

/// Parses a frame rate like "24000/1001" or "30/1" or "25".
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let mut parts = rate.split('/');
    let num = parts.next()?.parse::<f64>().ok()?;
    match parts.next() {
        None => Some(num),
        Some(den) => {
            let den = den.parse::<f64>().ok()?;
            if den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video() {
        let json = r#"{
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.5", "size": "4000000"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "r_frame_rate": "24000/1001", "nb_read_packets": "300"},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;
        let info = parse_probe_output(Path::new("clip.mp4"), json).unwrap();
        assert_eq!(info.kind, MediaKind::Video);
        assert_eq!(info.format, "mov");
        assert_eq!(info.dimensions(), Some((1920, 1080)));
        assert!((info.duration_secs.unwrap() - 12.5).abs() < 1e-9);
        // 24000/1001 is 23.976...
        assert!((info.fps.unwrap() - 23.976).abs() < 0.01);
        assert_eq!(info.size_bytes, 4_000_000);
    }

    #[test]
    fn test_parse_gif() {
        let json = r#"{
            "format": {"format_name": "gif", "duration": "2.0", "size": "500000"},
            "streams": [
                {"codec_type": "video", "codec_name": "gif", "width": 480, "height": 270,
                 "r_frame_rate": "10/1", "nb_read_packets": "20"}
            ]
        }"#;
        let info = parse_probe_output(Path::new("loop.gif"), json).unwrap();
        assert_eq!(info.kind, MediaKind::Gif);
        assert_eq!(info.fps, Some(10.0));
    }

    #[test]
    fn test_parse_single_frame_gif_is_image() {
        let json = r#"{
            "format": {"format_name": "gif", "size": "9000"},
            "streams": [
                {"codec_type": "video", "codec_name": "gif", "width": 100, "height": 100,
                 "r_frame_rate": "25/1", "nb_read_packets": "1"}
            ]
        }"#;
        let info = parse_probe_output(Path::new("still.gif"), json).unwrap();
        assert_eq!(info.kind, MediaKind::Image);
    }

    #[test]
    fn test_parse_image() {
        let json = r#"{
            "format": {"format_name": "png_pipe", "size": "123456"},
            "streams": [
                {"codec_type": "video", "codec_name": "png", "width": 800, "height": 600,
                 "r_frame_rate": "25/1", "nb_read_packets": "1"}
            ]
        }"#;
        let info = parse_probe_output(Path::new("pic.png"), json).unwrap();
        assert_eq!(info.kind, MediaKind::Image);
        assert_eq!(info.dimensions(), Some((800, 600)));
        assert!(info.duration_secs.is_none());
    }

    #[test]
    fn test_parse_audio() {
        let json = r#"{
            "format": {"format_name": "mp3", "duration": "180.0", "size": "3000000"},
            "streams": [
                {"codec_type": "audio", "codec_name": "mp3"}
            ]
        }"#;
        let info = parse_probe_output(Path::new("song.mp3"), json).unwrap();
        assert_eq!(info.kind, MediaKind::Audio);
        assert!(info.dimensions().is_none());
    }

    #[test]
    fn test_parse_no_streams_fails() {
        let json = r#"{"format": {"format_name": "data"}, "streams": []}"#;
        let result = parse_probe_output(Path::new("blob.bin"), json);
        assert!(matches!(result, Err(ProcessingError::ProbeFailed { .. })));
    }

    #[test]
    fn test_parse_garbage_fails() {
        let result = parse_probe_output(Path::new("x"), "not json");
        assert!(matches!(result, Err(ProcessingError::ProbeFailed { .. })));
    }

    #[test]
    fn test_frame_rate_forms() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(MediaKind::Video.as_str(), "video");
        assert_eq!(MediaKind::Gif.default_extension(), "gif");
        assert!(MediaKind::Image.is_visual());
        assert!(!MediaKind::Audio.is_visual());
    }
}
