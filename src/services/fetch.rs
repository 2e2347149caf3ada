//! Source image retrieval
//!
//! The pipeline reads source images through the `ImageFetcher` trait so
//! tests can serve bytes without touching the network.

use crate::error::{Result, SegmentError};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Url};
use std::time::Duration;

/// Parse and validate a client supplied image URL
///
/// Only absolute `http` and `https` URLs with a host are accepted.
///
/// # Errors
/// - `InvalidUrl` for empty, unparsable or non-http(s) URLs
pub fn validate_image_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SegmentError::invalid_url("URL is empty"));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| SegmentError::invalid_url(format!("'{trimmed}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {},
        scheme => {
            return Err(SegmentError::invalid_url(format!(
                "unsupported scheme '{scheme}', expected http or https"
            )));
        },
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(SegmentError::invalid_url(format!("'{trimmed}' has no host")));
    }

    Ok(url)
}

/// Source of encoded image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Retrieve the raw bytes behind `url`
    ///
    /// # Errors
    /// - `Network` for connection failures, timeouts, non-success status
    ///   codes and oversized bodies
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Fetches images over HTTP(S) with a timeout and a body size limit
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpImageFetcher {
    /// Create a fetcher with the given request timeout and body size limit
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SegmentError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, max_bytes })
    }

    fn too_large(&self, url: &Url) -> SegmentError {
        SegmentError::network_error(
            format!("Failed to fetch {url}"),
            format!("image exceeds the {} byte limit", self.max_bytes),
        )
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    #[tracing::instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SegmentError::network_error(format!("Failed to fetch {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SegmentError::network_error(
                format!("Failed to fetch {url}"),
                format!("HTTP error {status}"),
            ));
        }

        if response
            .content_length()
            .is_some_and(|length| length > self.max_bytes)
        {
            return Err(self.too_large(url));
        }

        let mut body = Vec::with_capacity(
            response
                .content_length()
                .map_or(0, |length| length as usize),
        );
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                SegmentError::network_error(format!("Failed to read body of {url}"), e)
            })?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large(url));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(bytes = body.len(), "Fetched source image");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_http_and_https() {
        let url = validate_image_url("https://example.com/cat.png").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert!(validate_image_url("  http://127.0.0.1:8080/a.jpg ").is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        for raw in [
            "",
            "   ",
            "not a url",
            "ftp://example.com/a.png",
            "file:///etc/passwd",
            "data:image/png;base64,AAAA",
            "/relative/path.png",
        ] {
            let err = validate_image_url(raw).unwrap_err();
            assert!(
                matches!(err, SegmentError::InvalidUrl(_)),
                "{raw:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(2), 1024).unwrap();
        let url = Url::parse("http://127.0.0.1:1/image.png").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, SegmentError::Network(_)));
        assert!(!err.to_string().is_empty());
    }
}
