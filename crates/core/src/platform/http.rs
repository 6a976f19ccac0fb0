//! HTTP download helper for [`crate::platform::MediaHost`] implementations.

use futures::StreamExt;
use tracing::debug;

use crate::error::ProcessingError;
use crate::sizefit::format_bytes;

/// Fetches the bytes behind `url`, refusing anything over `max_bytes`.
///
/// The advertised Content-Length is checked before the body is pulled, and
/// the running total is enforced while streaming for servers that do not
/// advertise one.
pub async fn fetch_url(
    client: &reqwest::Client,
    url: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ProcessingError> {
    let response = client.get(url).send().await?.error_for_status()?;

    if let Some(length) = response.content_length() {
        if length > max_bytes {
            return Err(ProcessingError::user_facing(format!(
                "file at {url} is {} which is over the {} download limit",
                format_bytes(length),
                format_bytes(max_bytes)
            )));
        }
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(ProcessingError::user_facing(format!(
                "file at {url} exceeded the {} download limit",
                format_bytes(max_bytes)
            )));
        }
        body.extend_from_slice(&chunk);
    }

    debug!("fetched {} from {url}", format_bytes(body.len() as u64));
    Ok(body)
}
