//! Error taxonomy for request processing.
//!
//! [`ProcessingError::UserFacing`] is the only variant rendered to the
//! caller as-is; everything else is bug-class and surfaced with diagnostics.

use thiserror::Error;

/// Errors that can occur while processing a request.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// External codec engine exited non-zero.
    #[error("'{program}' exited with an error")]
    CommandFailed { program: String, output: String },

    /// Expected, non-defect condition (input too large, cannot fit,
    /// unsupported kind); shown to the caller without diagnostics.
    #[error("{0}")]
    UserFacing(String),

    /// A step was expected to produce an artifact or message and produced
    /// neither.
    #[error("step produced nothing: {0}")]
    EmptyResult(String),

    /// Failed to probe a media file.
    #[error("failed to probe media: {reason}")]
    ProbeFailed { reason: String },

    /// Failed to fetch a source.
    #[error("download failed: {0}")]
    Download(String),

    /// I/O error on a scratch file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal defect.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProcessingError {
    /// Creates a new command failed error with the captured output.
    pub fn command_failed(program: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandFailed {
            program: program.into(),
            output: output.into(),
        }
    }

    /// Creates a new user-facing error.
    pub fn user_facing(message: impl Into<String>) -> Self {
        Self::UserFacing(message.into())
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this is an expected condition, rendered to the caller as a
    /// plain message with no diagnostics.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::UserFacing(_))
    }

    /// The captured codec output, when there is any.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProcessingError {
    fn from(e: reqwest::Error) -> Self {
        Self::Download(e.to_string())
    }
}
