//! Trait definition for the chat platform collaborator.

use async_trait::async_trait;
use std::path::Path;

use crate::error::ProcessingError;

/// Where a request currently is, pushed to the host as status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Downloading,
    TypeChecking,
    Resizing,
    DurationCapping,
    Queued,
    Executing,
    FittingOutput,
    Uploading,
}

impl RequestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::TypeChecking => "type checking",
            Self::Resizing => "resizing",
            Self::DurationCapping => "duration capping",
            Self::Queued => "queued",
            Self::Executing => "processing",
            Self::FittingOutput => "fitting output size",
            Self::Uploading => "uploading",
        }
    }
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chat platform, as far as the pipeline is concerned: a place to find
/// input media, to report progress, and to deliver the final artifact.
///
/// The platform itself (message history scanning, command parsing, user
/// preferences) is out of scope; implementations adapt a real client to
/// these five calls.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Locates up to `wanted` source URLs for the current request. Returning
    /// fewer than `wanted` means the required media could not be found,
    /// which ends the request without error.
    async fn locate_media(&self, wanted: usize) -> Result<Vec<String>, ProcessingError>;

    /// Fetches the raw bytes behind a URL previously returned by
    /// [`Self::locate_media`].
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProcessingError>;

    /// Pushes a progress update. Failures to edit status messages are the
    /// host's problem; the pipeline never aborts over them.
    async fn update_status(&self, phase: RequestPhase);

    /// Sends a plain message to the caller (warnings, rejections, error
    /// explanations).
    async fn notify(&self, message: &str);

    /// Delivers the final artifact.
    async fn deliver(&self, artifact: &Path, filename: Option<&str>)
        -> Result<(), ProcessingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_labels() {
        assert_eq!(RequestPhase::Downloading.as_str(), "downloading");
        assert_eq!(RequestPhase::Executing.to_string(), "processing");
        assert_eq!(RequestPhase::FittingOutput.as_str(), "fitting output size");
    }
}
