use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

use crate::converter::FfmpegConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scratch: ScratchConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub codec: FfmpegConfig,
}

/// Scratch directory configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScratchConfig {
    /// Manually specified scratch directory. When unset, an in-memory
    /// filesystem is preferred if one exists, falling back to the OS temp
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Size and duration limits applied to inputs and outputs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Platform upload limit in bytes. Results are shrunk to fit under this.
    #[serde(default = "default_file_upload_limit")]
    pub file_upload_limit_bytes: u64,

    /// Results over this size are rejected outright, with no shrink attempt.
    #[serde(default = "default_way_too_big")]
    pub way_too_big_bytes: u64,

    /// Maximum size, in bytes, of a single input download.
    #[serde(default = "default_max_download")]
    pub max_download_bytes: u64,

    /// Maximum number of frames an input video may have before it is trimmed.
    #[serde(default = "default_max_frames")]
    pub max_frames: u64,

    /// Frame rate cap applied to input videos.
    #[serde(default = "default_max_fps")]
    pub max_fps: f64,

    /// Minimum width/height that inputs are sized up to if below.
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,

    /// Maximum width/height that inputs are sized down to if above.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Audio bitrate, in bits per second, used when re-encoding video to fit.
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_bps: u64,
}

fn default_file_upload_limit() -> u64 {
    8_388_119
}

fn default_way_too_big() -> u64 {
    100_000_000
}

fn default_max_download() -> u64 {
    25_000_000
}

fn default_max_frames() -> u64 {
    1024
}

fn default_max_fps() -> f64 {
    100.0
}

fn default_min_dimension() -> u32 {
    100
}

fn default_max_dimension() -> u32 {
    2000
}

fn default_audio_bitrate() -> u64 {
    128_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            file_upload_limit_bytes: default_file_upload_limit(),
            way_too_big_bytes: default_way_too_big(),
            max_download_bytes: default_max_download(),
            max_frames: default_max_frames(),
            max_fps: default_max_fps(),
            min_dimension: default_min_dimension(),
            max_dimension: default_max_dimension(),
            audio_bitrate_bps: default_audio_bitrate(),
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// How many heavy transformations may run at once.
    #[serde(default)]
    pub capacity: WorkerCapacity,
}

/// Number of heavy transformations allowed to run simultaneously.
///
/// Accepts `"auto"` (one slot per available core), `"unbounded"` (no gating
/// at all), or a fixed count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerCapacity {
    #[default]
    Auto,
    Unbounded,
    Fixed(usize),
}

impl WorkerCapacity {
    /// Resolves to a concrete slot count; `None` means no gating.
    pub fn resolve(&self) -> Option<usize> {
        match self {
            Self::Auto => Some(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            ),
            Self::Unbounded => None,
            Self::Fixed(n) => Some(*n),
        }
    }
}

impl Serialize for WorkerCapacity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Unbounded => serializer.serialize_str("unbounded"),
            Self::Fixed(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for WorkerCapacity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u64),
            Word(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(Self::Fixed(n as usize)),
            Repr::Word(w) => match w.as_str() {
                "auto" => Ok(Self::Auto),
                "unbounded" => Ok(Self::Unbounded),
                other => Err(serde::de::Error::custom(format!(
                    "expected \"auto\", \"unbounded\" or a number, got \"{}\"",
                    other
                ))),
            },
        }
    }
}
