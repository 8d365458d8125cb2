//! Raw image byte fetches over plain HTTP

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use super::{ApiError, ApiResult, ImageFetcher};

/// Timeout for a whole image fetch (seconds)
pub const IMAGE_FETCH_TIMEOUT_SECS: u64 = 5;

/// [`ImageFetcher`] backed by a reqwest client with a short timeout
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// Create a fetcher with the default 5 second timeout
    pub fn new() -> ApiResult<Self> {
        Self::with_timeout(Duration::from_secs(IMAGE_FETCH_TIMEOUT_SECS))
    }

    /// Create a fetcher with a custom timeout
    pub fn with_timeout(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> ApiResult<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Image fetch failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;
        debug!(size = bytes.len(), "Image successfully fetched");
        Ok(bytes)
    }
}
