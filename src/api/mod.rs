//! Remote image API collaborators
//!
//! The rotation manager only talks to the outside world through two seams:
//!
//! - [`ImageApi`] - authenticate, search a random photo for a topic and notify
//!   the platform that a photo was downloaded
//! - [`ImageFetcher`] - plain HTTP GET of the raw image bytes
//!
//! [`unsplash::UnsplashClient`] and [`http::HttpImageFetcher`] are the
//! production implementations.

use crate::Orientation;
use async_trait::async_trait;
use bytes::Bytes;

pub mod attribution;
pub mod http;
pub mod unsplash;

pub use attribution::Referral;
pub use http::HttpImageFetcher;
pub use unsplash::UnsplashClient;

/// Image API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The client has not been connected yet
    #[error("not connected to the image API")]
    NotConnected,

    /// Credentials were rejected by the remote API
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The remote API reported its own rate limit
    #[error("rate limit exceeded by remote API")]
    RateLimited,

    /// Non-success HTTP status
    #[error("unexpected HTTP status {status} from {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Network or transport error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Client construction or configuration error
    #[error("client configuration error: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Whether the error means the current connection can no longer be used
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, ApiError::NotConnected | ApiError::Unauthorized(_))
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// API credentials for the remote image platform
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    access_key: String,
    secret_key: String,
}

impl ApiCredentials {
    /// Create credentials from an access key and a secret key
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Public access key (sent as `Client-ID`)
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Secret key
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A random photo returned by a search, before its bytes are fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoCandidate {
    /// Remote photo identifier
    pub id: String,
    /// Direct URL of the sized image
    pub image_url: String,
    /// Photographer display name
    pub photographer_name: String,
    /// Photographer profile page
    pub photographer_profile: String,
}

/// Remote image search API
#[async_trait]
pub trait ImageApi: Send + Sync {
    /// Authenticate and prepare the client
    ///
    /// Must not spend request quota.
    async fn connect(&self) -> ApiResult<()>;

    /// Request one random photo for `topic`
    ///
    /// # Returns
    /// `Ok(None)` when the API has no candidate for the query
    async fn search_random(
        &self,
        topic: &str,
        width: u32,
        height: u32,
        orientation: Orientation,
    ) -> ApiResult<Option<PhotoCandidate>>;

    /// Tell the platform that photo `id` was downloaded
    async fn notify_download(&self, id: &str) -> ApiResult<()>;
}

/// Plain HTTP GET for raw image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the full body at `url`, failing on non-success statuses
    async fn fetch(&self, url: &str) -> ApiResult<Bytes>;
}
