//! Rotation configuration and scheduling constants

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::api::ApiCredentials;
use crate::session::SESSION_FILE_NAME;
use crate::Orientation;

/// Request quota of the demo API tier (per hour)
pub const MAX_DEMO_REQUESTS_PER_HOUR: u32 = 50;

/// Request quota of the production API tier (per hour)
pub const MAX_PROD_REQUESTS_PER_HOUR: u32 = 5000;

/// Requests charged per downloaded image: one search plus one download notification
pub const REQUESTS_PER_IMAGE_DOWNLOAD: u32 = 2;

/// Length of a quota window
pub const QUOTA_WINDOW: Duration = Duration::from_secs(3600);

/// Polling interval while the hourly quota is exhausted
pub const QUOTA_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Wait between failed connection attempts
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Default wait between downloads (before jitter)
pub const DEFAULT_DOWNLOAD_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound of the random jitter added to every download wait (seconds)
pub const MAX_DOWNLOAD_JITTER_SECS: u64 = 10;

/// Default image width in pixels
pub const DEFAULT_IMAGE_WIDTH: u32 = 320;

/// Default image height in pixels
pub const DEFAULT_IMAGE_HEIGHT: u32 = 240;

/// Hourly request quota of the image API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaMode {
    /// Demo tier, 50 requests per hour
    #[default]
    Demo,
    /// Production tier, 5000 requests per hour
    Production,
    /// Custom requests-per-hour limit
    Custom(u32),
}

impl QuotaMode {
    /// Maximum requests allowed per hour
    pub fn requests_per_hour(&self) -> u32 {
        match self {
            QuotaMode::Demo => MAX_DEMO_REQUESTS_PER_HOUR,
            QuotaMode::Production => MAX_PROD_REQUESTS_PER_HOUR,
            QuotaMode::Custom(limit) => *limit,
        }
    }
}

impl FromStr for QuotaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "demo" => Ok(QuotaMode::Demo),
            "production" | "prod" => Ok(QuotaMode::Production),
            other => other.parse::<u32>().map(QuotaMode::Custom).map_err(|_| {
                format!("Invalid quota mode: {s}. Valid options: demo, production, <requests per hour>")
            }),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Application name is empty
    #[error("application name must not be empty")]
    EmptyApplicationName,

    /// API access key is empty
    #[error("API access key must not be empty")]
    EmptyAccessKey,

    /// No topics configured
    #[error("at least one topic is required")]
    NoTopics,

    /// A topic is blank or unusable as a file name prefix
    #[error("invalid topic {0:?}: topics must be non-blank and contain no path separators")]
    InvalidTopic(String),

    /// A topic is listed twice
    #[error("duplicate topic {0:?}")]
    DuplicateTopic(String),

    /// Width or height is zero
    #[error("image dimensions must be positive, got {width}x{height}")]
    InvalidDimensions {
        /// Configured width
        width: u32,
        /// Configured height
        height: u32,
    },

    /// Pool cap is zero
    #[error("maximum pool size must be positive")]
    InvalidPoolSize,

    /// Quota cannot pay for a single image
    #[error("quota of {0} requests per hour cannot pay for one image download")]
    QuotaTooSmall(u32),
}

/// Immutable, validated rotator configuration
#[derive(Debug, Clone)]
pub struct RotatorConfig {
    application_name: String,
    credentials: ApiCredentials,
    quota_mode: QuotaMode,
    image_dir: PathBuf,
    topics: Vec<String>,
    image_width: u32,
    image_height: u32,
    orientation: Orientation,
    max_pool_size: u32,
    download_interval: Duration,
}

impl RotatorConfig {
    /// Start building a configuration
    pub fn builder(
        application_name: impl Into<String>,
        credentials: ApiCredentials,
    ) -> RotatorConfigBuilder {
        RotatorConfigBuilder::new(application_name, credentials)
    }

    /// Application name used for referral tagging
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// API credentials
    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }

    /// Quota mode
    pub fn quota_mode(&self) -> QuotaMode {
        self.quota_mode
    }

    /// Maximum API requests per hour
    pub fn max_requests_per_hour(&self) -> u32 {
        self.quota_mode.requests_per_hour()
    }

    /// Directory holding the image files and the session snapshot
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Configured topics, in configuration order
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Requested image width in pixels
    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    /// Requested image height in pixels
    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Requested image orientation
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Effective pool cap
    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size as usize
    }

    /// Wait between downloads, before jitter
    pub fn download_interval(&self) -> Duration {
        self.download_interval
    }

    /// Path of the session snapshot file
    pub fn session_path(&self) -> PathBuf {
        self.image_dir.join(SESSION_FILE_NAME)
    }
}

/// Builder for [`RotatorConfig`]
#[derive(Debug, Clone)]
pub struct RotatorConfigBuilder {
    application_name: String,
    credentials: ApiCredentials,
    quota_mode: QuotaMode,
    image_dir: PathBuf,
    topics: Vec<String>,
    image_width: u32,
    image_height: u32,
    orientation: Orientation,
    max_pool_size: Option<u32>,
    download_interval: Duration,
}

impl RotatorConfigBuilder {
    fn new(application_name: impl Into<String>, credentials: ApiCredentials) -> Self {
        Self {
            application_name: application_name.into(),
            credentials,
            quota_mode: QuotaMode::default(),
            image_dir: PathBuf::from("images"),
            topics: Vec::new(),
            image_width: DEFAULT_IMAGE_WIDTH,
            image_height: DEFAULT_IMAGE_HEIGHT,
            orientation: Orientation::default(),
            max_pool_size: None,
            download_interval: DEFAULT_DOWNLOAD_INTERVAL,
        }
    }

    /// Set the quota mode
    pub fn quota_mode(mut self, quota_mode: QuotaMode) -> Self {
        self.quota_mode = quota_mode;
        self
    }

    /// Set the image storage directory
    pub fn image_dir(mut self, image_dir: impl Into<PathBuf>) -> Self {
        self.image_dir = image_dir.into();
        self
    }

    /// Set the topics to download images for
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set the requested image size in pixels
    pub fn image_size(mut self, width: u32, height: u32) -> Self {
        self.image_width = width;
        self.image_height = height;
        self
    }

    /// Set the requested orientation
    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Lower the pool cap below the quota-derived default
    pub fn max_pool_size(mut self, max_pool_size: u32) -> Self {
        self.max_pool_size = Some(max_pool_size);
        self
    }

    /// Set the wait between downloads (jitter is added on top)
    pub fn download_interval(mut self, interval: Duration) -> Self {
        self.download_interval = interval;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<RotatorConfig, ConfigError> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigError::EmptyApplicationName);
        }
        if self.credentials.access_key().trim().is_empty() {
            return Err(ConfigError::EmptyAccessKey);
        }
        if self.topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        for (i, topic) in self.topics.iter().enumerate() {
            if topic.trim().is_empty() || topic.contains(['/', '\\']) || topic == "." || topic == ".." {
                return Err(ConfigError::InvalidTopic(topic.clone()));
            }
            if self.topics[..i].contains(topic) {
                return Err(ConfigError::DuplicateTopic(topic.clone()));
            }
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(ConfigError::InvalidDimensions {
                width: self.image_width,
                height: self.image_height,
            });
        }

        let quota = self.quota_mode.requests_per_hour();
        if quota < REQUESTS_PER_IMAGE_DOWNLOAD {
            return Err(ConfigError::QuotaTooSmall(quota));
        }

        // Cap is bounded by what one hour of quota can download
        let quota_cap = quota / REQUESTS_PER_IMAGE_DOWNLOAD;
        let max_pool_size = match self.max_pool_size {
            Some(0) => return Err(ConfigError::InvalidPoolSize),
            Some(requested) => requested.min(quota_cap),
            None => quota_cap,
        };

        Ok(RotatorConfig {
            application_name: self.application_name,
            credentials: self.credentials,
            quota_mode: self.quota_mode,
            image_dir: self.image_dir,
            topics: self.topics,
            image_width: self.image_width,
            image_height: self.image_height,
            orientation: self.orientation,
            max_pool_size,
            download_interval: self.download_interval,
        })
    }
}
