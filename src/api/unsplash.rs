//! Unsplash API client
//!
//! Implements [`ImageApi`] against the public Unsplash REST API using
//! `Client-ID` authentication. Connecting only prepares the authenticated
//! HTTP client, so it never spends request quota. Every connect builds a new
//! client, which drops pooled connections after credentials were rejected.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ApiCredentials, ApiError, ApiResult, ImageApi, PhotoCandidate};
use crate::Orientation;

/// Production API endpoint
pub const UNSPLASH_API_URL: &str = "https://api.unsplash.com";

/// API version pinned through the `Accept-Version` header
const API_VERSION: &str = "v1";

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds)
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Unsplash REST client
pub struct UnsplashClient {
    base_url: String,
    credentials: ApiCredentials,
    client: RwLock<Option<Client>>,
}

impl UnsplashClient {
    /// Create a client for the production API
    pub fn new(credentials: ApiCredentials) -> Self {
        Self::with_base_url(credentials, UNSPLASH_API_URL)
    }

    /// Create a client against a custom endpoint (proxies, test servers)
    pub fn with_base_url(credentials: ApiCredentials, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client: RwLock::new(None),
        }
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether [`ImageApi::connect`] has succeeded
    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }

    fn build_client(&self) -> ApiResult<Client> {
        let access_key = self.credentials.access_key().trim();
        if access_key.is_empty() {
            return Err(ApiError::Unauthorized("empty access key".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Client-ID {access_key}"))
            .map_err(|e| ApiError::Configuration(format!("invalid access key: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert("accept-version", HeaderValue::from_static(API_VERSION));

        Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::Configuration(e.to_string()))
    }

    async fn connected_client(&self) -> ApiResult<Client> {
        self.client.read().await.clone().ok_or(ApiError::NotConnected)
    }

    async fn send(&self, url: &str, params: &[(&str, String)]) -> ApiResult<Response> {
        let client = self.connected_client().await?;
        debug!("Making GET request to: {} with {} params", url, params.len());
        client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))
    }
}

/// Map non-success statuses onto [`ApiError`]
fn check_status(response: Response, url: &str) -> ApiResult<Response> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(status = status.as_u16(), "Image API rejected credentials");
            Err(ApiError::Unauthorized(format!("HTTP {status}")))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            warn!("Rate limit error (429) from image API");
            Err(ApiError::RateLimited)
        }
        _ => Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}

#[async_trait]
impl ImageApi for UnsplashClient {
    async fn connect(&self) -> ApiResult<()> {
        info!(base_url = %self.base_url, "Connecting to image API");
        let built = self.build_client();
        let mut client = self.client.write().await;
        match built {
            Ok(fresh) => {
                *client = Some(fresh);
                info!("Connected to image API");
                Ok(())
            }
            Err(e) => {
                *client = None;
                Err(e)
            }
        }
    }

    async fn search_random(
        &self,
        topic: &str,
        width: u32,
        height: u32,
        orientation: Orientation,
    ) -> ApiResult<Option<PhotoCandidate>> {
        let url = format!("{}/photos/random", self.base_url);
        let params = [
            ("query", topic.to_string()),
            ("w", width.to_string()),
            ("h", height.to_string()),
            ("orientation", orientation.as_str().to_string()),
        ];

        let response = self.send(&url, &params).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(topic, "No random photo available for topic");
            return Ok(None);
        }

        let body = check_status(response, &url)?
            .text()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;
        parse_random_photo(&body)
    }

    async fn notify_download(&self, id: &str) -> ApiResult<()> {
        let url = format!("{}/photos/{}/download", self.base_url, id);
        let response = self.send(&url, &[]).await?;
        check_status(response, &url)?;
        debug!(photo_id = id, "Download notified");
        Ok(())
    }
}

/// `GET /photos/random` answers with one object, or an array when `count` is set
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RandomResponse {
    One(RandomPhoto),
    Many(Vec<RandomPhoto>),
}

#[derive(Debug, Deserialize)]
struct RandomPhoto {
    id: String,
    urls: PhotoUrls,
    user: PhotoUser,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    small: String,
}

#[derive(Debug, Deserialize)]
struct PhotoUser {
    name: String,
    links: UserLinks,
}

#[derive(Debug, Deserialize)]
struct UserLinks {
    html: String,
}

impl From<RandomPhoto> for PhotoCandidate {
    fn from(photo: RandomPhoto) -> Self {
        PhotoCandidate {
            id: photo.id,
            image_url: photo.urls.small,
            photographer_name: photo.user.name,
            photographer_profile: photo.user.links.html,
        }
    }
}

/// Parse a random-photo response body into a candidate
pub fn parse_random_photo(body: &str) -> ApiResult<Option<PhotoCandidate>> {
    let response: RandomResponse =
        serde_json::from_str(body).map_err(|e| ApiError::ParseError(e.to_string()))?;
    Ok(match response {
        RandomResponse::One(photo) => Some(photo.into()),
        RandomResponse::Many(photos) => photos.into_iter().next().map(PhotoCandidate::from),
    })
}
