//! Types for the pipeline module.

use std::future::Future;
use std::path::PathBuf;

use futures::future::BoxFuture;

use crate::converter::MediaKind;
use crate::error::ProcessingError;
use crate::executor::WorkerScope;
use crate::scratch::TempFile;

/// What a request needs and how its inputs are treated.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Allowed media kinds per input argument; an empty list means the
    /// request needs no media at all.
    pub input_kinds: Vec<Vec<MediaKind>>,
    /// Rescale inputs outside the configured dimension bounds before the
    /// heavy step runs.
    pub normalize_resolution: bool,
    /// Whether the job is expected to produce an artifact (as opposed to a
    /// text message).
    pub expects_artifact: bool,
    /// Privileged callers skip duration capping.
    pub privileged: bool,
    /// Filename to deliver the artifact under.
    pub upload_filename: Option<String>,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            input_kinds: Vec::new(),
            normalize_resolution: true,
            expects_artifact: true,
            privileged: false,
            upload_filename: None,
        }
    }
}

impl RequestSpec {
    /// A request taking no input media.
    pub fn no_inputs() -> Self {
        Self::default()
    }

    /// A request taking one input of any of the given kinds.
    pub fn single_input(kinds: Vec<MediaKind>) -> Self {
        Self {
            input_kinds: vec![kinds],
            ..Self::default()
        }
    }

    /// Sets the allowed kinds per input argument.
    pub fn with_inputs(mut self, input_kinds: Vec<Vec<MediaKind>>) -> Self {
        self.input_kinds = input_kinds;
        self
    }

    /// Disables input resolution normalization.
    pub fn without_resize(mut self) -> Self {
        self.normalize_resolution = false;
        self
    }

    /// Marks the request as producing a message rather than an artifact.
    pub fn expecting_message(mut self) -> Self {
        self.expects_artifact = false;
        self
    }

    /// Marks the caller as privileged.
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Sets the delivery filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.upload_filename = Some(filename.into());
        self
    }
}

/// What a job hands back.
#[derive(Debug)]
pub enum Produced {
    Artifact(TempFile),
    Message(String),
}

/// What an isolated job hands back; paths instead of handles, since handles
/// do not cross the worker boundary.
#[derive(Debug)]
pub enum WorkerProduced {
    Artifact(PathBuf),
    Message(String),
}

pub type AsyncJobFn =
    Box<dyn FnOnce(Vec<TempFile>) -> BoxFuture<'static, Result<Option<Produced>, ProcessingError>> + Send>;

pub type BlockingJobFn = Box<
    dyn FnOnce(&WorkerScope, Vec<PathBuf>) -> Result<Option<WorkerProduced>, ProcessingError>
        + Send,
>;

/// The heavy step of a request.
///
/// `Scheduler` jobs are async and run on the cooperative scheduler (codec
/// subprocess orchestration); `Isolated` jobs are synchronous CPU-bound
/// work and run on a dedicated blocking thread with scratch merge-back.
/// Either way the job runs inside the admission queue slot.
pub enum Job {
    Scheduler(AsyncJobFn),
    Isolated(BlockingJobFn),
}

impl Job {
    /// Wraps an async job.
    pub fn scheduler<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Vec<TempFile>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Produced>, ProcessingError>> + Send + 'static,
    {
        Self::Scheduler(Box::new(move |files| Box::pin(f(files))))
    }

    /// Wraps a synchronous CPU-bound job.
    pub fn isolated<F>(f: F) -> Self
    where
        F: FnOnce(&WorkerScope, Vec<PathBuf>) -> Result<Option<WorkerProduced>, ProcessingError>
            + Send
            + 'static,
    {
        Self::Isolated(Box::new(f))
    }
}

/// How a request ended.
#[derive(Debug)]
pub enum RequestOutcome {
    /// The artifact was fitted and delivered.
    Delivered { path: PathBuf, size_bytes: u64 },
    /// The job produced a text message instead of an artifact.
    Text(String),
    /// Required input media could not be found. Terminal, not an error.
    NoMediaFound,
    /// The request was turned down with a user-facing message (wrong input
    /// kind, too large, cannot fit). Terminal, not an error.
    Rejected { message: String },
}

impl RequestOutcome {
    /// Label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Text(_) => "text",
            Self::NoMediaFound => "no_media",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Computes the dimensions an input should be rescaled to so both axes land
/// inside `[min, max]`, preserving aspect ratio. Returns `None` when the
/// input is already within bounds.
///
/// When the two constraints cannot both be met (extreme aspect ratios), the
/// maximum bound wins and the short axis is left below `min`.
pub(crate) fn clamp_dimensions(
    width: u32,
    height: u32,
    min: u32,
    max: u32,
) -> Option<(u32, u32)> {
    let w = width as f64;
    let h = height as f64;

    let up = (min as f64 / w).max(min as f64 / h).max(1.0);
    let (w, h) = (w * up, h * up);
    let down = (max as f64 / w).min(max as f64 / h).min(1.0);
    let (w, h) = (w * down, h * down);

    let clamped = ((w.round() as u32).max(1), (h.round() as u32).max(1));
    if clamped == (width, height) {
        None
    } else {
        Some(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_bounds_needs_no_resize() {
        assert_eq!(clamp_dimensions(500, 500, 100, 2000), None);
        assert_eq!(clamp_dimensions(100, 2000, 100, 2000), None);
    }

    #[test]
    fn test_too_small_scales_up() {
        assert_eq!(clamp_dimensions(50, 50, 100, 2000), Some((100, 100)));
        // short axis drives the upscale
        assert_eq!(clamp_dimensions(50, 200, 100, 2000), Some((100, 400)));
    }

    #[test]
    fn test_too_large_scales_down() {
        assert_eq!(clamp_dimensions(4000, 1000, 100, 2000), Some((2000, 500)));
        assert_eq!(clamp_dimensions(4000, 4000, 100, 2000), Some((2000, 2000)));
    }

    #[test]
    fn test_extreme_aspect_ratio_respects_max() {
        // cannot satisfy both bounds; the max bound wins
        let (w, h) = clamp_dimensions(10, 3000, 100, 2000).unwrap();
        assert!(w >= 1);
        assert_eq!(h, 2000);
    }

    #[test]
    fn test_spec_builders() {
        let spec = RequestSpec::single_input(vec![MediaKind::Video, MediaKind::Gif])
            .privileged()
            .with_filename("out.mp4");
        assert_eq!(spec.input_kinds.len(), 1);
        assert!(spec.privileged);
        assert!(spec.normalize_resolution);
        assert_eq!(spec.upload_filename.as_deref(), Some("out.mp4"));

        let spec = RequestSpec::no_inputs().expecting_message().without_resize();
        assert!(spec.input_kinds.is_empty());
        assert!(!spec.expects_artifact);
        assert!(!spec.normalize_resolution);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RequestOutcome::NoMediaFound.as_str(), "no_media");
        assert_eq!(
            RequestOutcome::Rejected {
                message: "x".to_string()
            }
            .as_str(),
            "rejected"
        );
    }
}
