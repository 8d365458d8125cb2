//! # Random Image Downloader Library
//!
//! Keeps a bounded, rotating pool of random images for a fixed set of topics
//! on local storage and serves random images from that pool on demand, while
//! respecting the hourly request quota of the remote image API.
//!
//! ## Features
//!
//! - **Rotation**: Once the pool reaches its cap, every new download first evicts
//!   an image from the most populated topic
//! - **Rate Limiting**: Hourly request quota tracking (`DEMO`, `PRODUCTION` or custom)
//! - **Topic Balancing**: New downloads go to the topic with the fewest images
//! - **Session Resume**: The pool metadata is persisted after every download and
//!   restored at setup so restarts do not re-download
//! - **Self-Healing Reads**: Images whose backing file disappeared are purged on read
//!
//! ## Quick Start
//!
//! ```no_run
//! use random_image_downloader::{ApiCredentials, ImageRotator, QuotaMode, RotatorConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = ApiCredentials::new("my-access-key", "my-secret-key");
//! let config = RotatorConfig::builder("my-app", credentials.clone())
//!     .quota_mode(QuotaMode::Demo)
//!     .image_dir("./images")
//!     .topics(["water", "fire", "lightning"])
//!     .max_pool_size(3)
//!     .build()?;
//!
//! let mut rotator = ImageRotator::unsplash(&credentials)?;
//! rotator.setup(config).await?;
//! rotator.start()?;
//!
//! if let Some(image) = rotator.get_random_image().await {
//!     println!("{} ({} bytes)", image.attribution, image.image.len());
//! }
//!
//! rotator.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`api`] - Remote image API and raw image fetch collaborators
//! - [`rotation`] - The rotation manager loop, quota tracking and topic balancing
//! - [`storage`] - Per-path locked file access for cached image bytes
//! - [`session`] - Persistent snapshot of the pool metadata
//! - [`provider`] - Random image retrieval for external callers
//! - [`rotator`] - Setup/start/stop facade tying everything together

#![warn(missing_docs)]
#![warn(clippy::all)]

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote image API collaborators
pub mod api;

/// Rotation metrics helpers
pub mod metrics;

/// Random image retrieval for callers
pub mod provider;

/// Background rotation and rate limiting
pub mod rotation;

/// Setup/start/stop facade
pub mod rotator;

/// Pool metadata persistence
pub mod session;

/// Cooperative shutdown signalling
pub mod shutdown;

/// Locked file access for cached images
pub mod storage;

// Re-export commonly used types
pub use api::{ApiCredentials, ImageApi, ImageFetcher};
pub use provider::ImageProvider;
pub use rotation::{QuotaMode, RotatorConfig, RotatorConfigBuilder};
pub use rotator::{ImageRotator, RotatorError};

/// A cached image tracked by the rotation pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Image {
    /// Remote photo identifier
    pub id: String,
    /// HTML attribution crediting the photographer and the platform
    pub attribution: String,
    /// Location of the image bytes on disk (unique across the pool)
    pub file_path: PathBuf,
    /// Topic the image was downloaded for
    pub topic: String,
}

/// An image handed out to callers, with its bytes already read from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ServedImage {
    /// HTML attribution crediting the photographer and the platform
    pub attribution: String,
    /// Remote photo identifier
    pub id: String,
    /// Raw image bytes
    pub image: Bytes,
    /// Topic the image belongs to
    pub topic: String,
}

/// Requested image orientation for random searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Wider than tall
    #[default]
    Landscape,
    /// Taller than wide
    Portrait,
    /// Roughly square
    Squarish,
}

impl Orientation {
    /// Query-string value understood by the image API
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Squarish => "squarish",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
