//! Background rotation and rate limiting
//!
//! The rotation manager runs one cycle at a time on its own task:
//!
//! 1. **Quota**: While the hourly quota cannot pay for another image, poll for
//!    a window reset every minute ([`rate_limit::RequestQuota`])
//! 2. **Connection**: Connect to the image API, retrying every 30 seconds
//! 3. **Pacing**: Wait the download interval plus up to 10 seconds of jitter
//!    (skipped on the first cycle)
//! 4. **Rotation**: At the pool cap, evict a random image of the fullest topic
//!    and download into that topic; otherwise grow the emptiest topic
//!    ([`balancer`])
//! 5. **Persistence**: Store the bytes, add the image to the [`pool::ImagePool`]
//!    and snapshot the pool
//!
//! # Error Handling
//!
//! Nothing here is fatal. A failed step aborts the current cycle with a
//! [`RotationError`], leaving the pool consistent with the file system, and
//! the next cycle tries again.

pub mod balancer;
pub mod config;
pub mod manager;
pub mod pool;
pub mod rate_limit;

pub use config::{ConfigError, QuotaMode, RotatorConfig, RotatorConfigBuilder};
pub use manager::{CycleOutcome, RotationManager, RotationState};
pub use pool::{ImagePool, PoolError, SharedPool};
pub use rate_limit::{RateLimitError, RequestQuota};

use crate::api::ApiError;
use crate::session::SessionError;
use crate::storage::FileStoreError;

/// Reasons a rotation cycle was aborted
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    /// Authenticating to the image API failed
    #[error("connection failure: {0}")]
    Connection(#[source] ApiError),

    /// Search, fetch or download notification failed
    #[error("download failure: {0}")]
    Download(#[from] ApiError),

    /// The image API returned no candidate for the topic
    #[error("no image available for topic {0:?}")]
    NoCandidate(String),

    /// The quota refused a request charge
    #[error("quota error: {0}")]
    Quota(#[from] RateLimitError),

    /// Reading, writing or deleting an image file failed
    #[error("file I/O failure: {0}")]
    FileIo(#[from] FileStoreError),

    /// The pool refused a mutation
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Saving or loading the session snapshot failed
    #[error("persistence failure: {0}")]
    Persistence(#[from] SessionError),
}
