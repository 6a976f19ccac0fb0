//! Testing utilities and mock implementations.
//!
//! Mock converter and chat host for exercising the pipeline without ffmpeg
//! or a real platform client. Mocks write real scratch files with scripted
//! sizes, so size-fitting and cleanup behave exactly as they do in
//! production.

mod mock_converter;
mod mock_host;

pub use mock_converter::{MockConverter, RecordedOp};
pub use mock_host::{DeliveredArtifact, MockMediaHost};
