//! Mock chat platform for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ProcessingError;
use crate::platform::{MediaHost, RequestPhase};

/// A delivered artifact recorded by the mock host.
#[derive(Debug, Clone)]
pub struct DeliveredArtifact {
    pub path: PathBuf,
    pub filename: Option<String>,
    pub size_bytes: u64,
}

/// Mock implementation of [`MediaHost`].
///
/// Media is scripted as `(url, bytes)` pairs; everything the pipeline sends
/// back (status phases, notices, deliveries) is recorded for assertions.
#[derive(Clone, Default)]
pub struct MockMediaHost {
    media: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
    statuses: Arc<RwLock<Vec<RequestPhase>>>,
    notices: Arc<RwLock<Vec<String>>>,
    delivered: Arc<RwLock<Vec<DeliveredArtifact>>>,
    fail_delivery: Arc<RwLock<bool>>,
}

impl MockMediaHost {
    /// Create a new mock host with no media.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source the pipeline can locate and fetch.
    pub async fn add_media(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.media.write().await.push((url.into(), bytes));
    }

    /// Status phases seen so far, in order.
    pub async fn statuses(&self) -> Vec<RequestPhase> {
        self.statuses.read().await.clone()
    }

    /// Messages sent to the caller so far.
    pub async fn notices(&self) -> Vec<String> {
        self.notices.read().await.clone()
    }

    /// Artifacts delivered so far.
    pub async fn delivered(&self) -> Vec<DeliveredArtifact> {
        self.delivered.read().await.clone()
    }

    /// Makes the next delivery fail.
    pub async fn set_fail_delivery(&self, fail: bool) {
        *self.fail_delivery.write().await = fail;
    }
}

#[async_trait]
impl MediaHost for MockMediaHost {
    async fn locate_media(&self, wanted: usize) -> Result<Vec<String>, ProcessingError> {
        Ok(self
            .media
            .read()
            .await
            .iter()
            .take(wanted)
            .map(|(url, _)| url.clone())
            .collect())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProcessingError> {
        self.media
            .read()
            .await
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ProcessingError::Download(format!("unknown url: {url}")))
    }

    async fn update_status(&self, phase: RequestPhase) {
        self.statuses.write().await.push(phase);
    }

    async fn notify(&self, message: &str) {
        self.notices.write().await.push(message.to_string());
    }

    async fn deliver(
        &self,
        artifact: &Path,
        filename: Option<&str>,
    ) -> Result<(), ProcessingError> {
        if *self.fail_delivery.read().await {
            return Err(ProcessingError::Download(
                "delivery rejected by platform".to_string(),
            ));
        }
        let size_bytes = std::fs::metadata(artifact).map(|m| m.len()).unwrap_or(0);
        self.delivered.write().await.push(DeliveredArtifact {
            path: artifact.to_path_buf(),
            filename: filename.map(str::to_string),
            size_bytes,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locate_and_fetch() {
        let host = MockMediaHost::new();
        host.add_media("https://x/a.png", vec![1, 2, 3]).await;
        host.add_media("https://x/b.mp4", vec![4]).await;

        let urls = host.locate_media(1).await.unwrap();
        assert_eq!(urls, vec!["https://x/a.png".to_string()]);

        let bytes = host.fetch("https://x/a.png").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        assert!(host.fetch("https://x/missing").await.is_err());
    }

    #[tokio::test]
    async fn test_locate_returns_fewer_when_scarce() {
        let host = MockMediaHost::new();
        host.add_media("https://x/only.png", vec![0]).await;
        let urls = host.locate_media(2).await.unwrap();
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn test_records_statuses_and_notices() {
        let host = MockMediaHost::new();
        host.update_status(RequestPhase::Queued).await;
        host.notify("heads up").await;

        assert_eq!(host.statuses().await, vec![RequestPhase::Queued]);
        assert_eq!(host.notices().await, vec!["heads up".to_string()]);
    }
}
