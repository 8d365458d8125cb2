//! Rotation manager: the background download loop
//!
//! One cycle checks the quota, makes sure the API is connected, waits out the
//! download interval, frees a slot if the pool is full and downloads one image.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::balancer;
use super::config::{
    RotatorConfig, CONNECT_RETRY_INTERVAL, MAX_DOWNLOAD_JITTER_SECS, QUOTA_POLL_INTERVAL,
    REQUESTS_PER_IMAGE_DOWNLOAD,
};
use super::pool::SharedPool;
use super::rate_limit::RequestQuota;
use super::RotationError;
use crate::api::{ApiError, ImageApi, ImageFetcher, Referral};
use crate::metrics;
use crate::session::SessionError;
use crate::shutdown::SharedShutdown;
use crate::storage::RemoveOutcome;
use crate::Image;

/// Observable state of the manager between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// Not authenticated with the image API
    Disconnected,
    /// Connected, with quota left for another image
    ConnectedIdle,
    /// Waiting for the quota window to reset
    QuotaExhausted,
}

/// Result of one rotation cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Quota exhausted; polled once for a window reset
    QuotaWait {
        /// Whether the poll opened a new window
        reset: bool,
    },
    /// Connecting failed; waited before the next attempt
    ConnectFailed(RotationError),
    /// No topic could be selected
    Skipped,
    /// A new image was stored and pooled
    Downloaded(Image),
    /// A step failed; nothing was pooled
    Aborted(RotationError),
    /// Shutdown was requested during the pacing wait
    Stopped,
}

/// Bytes and metadata of a freshly downloaded photo
struct DownloadedImage {
    id: String,
    attribution: String,
    bytes: Bytes,
}

/// Owns the quota and connection state and mutates the shared pool
pub struct RotationManager {
    config: Arc<RotatorConfig>,
    api: Arc<dyn ImageApi>,
    fetcher: Arc<dyn ImageFetcher>,
    shared: Arc<SharedPool>,
    shutdown: SharedShutdown,
    referral: Referral,
    quota: RequestQuota,
    connected: bool,
    first_cycle: bool,
    rng: StdRng,
}

impl RotationManager {
    /// Create a manager with a fresh quota window, seeded from the OS
    pub fn new(
        config: Arc<RotatorConfig>,
        api: Arc<dyn ImageApi>,
        fetcher: Arc<dyn ImageFetcher>,
        shared: Arc<SharedPool>,
        shutdown: SharedShutdown,
    ) -> Self {
        let referral = Referral::new(config.application_name());
        let quota = RequestQuota::hourly(config.max_requests_per_hour());
        Self {
            config,
            api,
            fetcher,
            shared,
            shutdown,
            referral,
            quota,
            connected: false,
            first_cycle: true,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replace the random source used for jitter and eviction
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Current state
    pub fn state(&self) -> RotationState {
        if !self.quota.has_quota_for(REQUESTS_PER_IMAGE_DOWNLOAD) {
            RotationState::QuotaExhausted
        } else if self.connected {
            RotationState::ConnectedIdle
        } else {
            RotationState::Disconnected
        }
    }

    /// Request quota of the current window
    pub fn quota(&self) -> &RequestQuota {
        &self.quota
    }

    /// Shared pool this manager fills
    pub fn shared(&self) -> &Arc<SharedPool> {
        &self.shared
    }

    /// Run cycles until shutdown is requested
    pub async fn run(mut self) {
        info!(
            topics = ?self.config.topics(),
            max_pool_size = self.config.max_pool_size(),
            max_requests_per_hour = self.quota.max_requests(),
            "Rotation manager started"
        );
        while !self.shutdown.is_shutdown_requested() {
            let outcome = self.run_cycle().await;
            debug!(?outcome, "Rotation cycle finished");
        }
        info!("Rotation manager stopped");
    }

    /// Execute one cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if !self.quota.has_quota_for(REQUESTS_PER_IMAGE_DOWNLOAD) {
            return self.wait_for_quota_reset().await;
        }

        if !self.connected {
            if let Err(e) = self.api.connect().await {
                warn!(
                    error = %e,
                    retry_secs = CONNECT_RETRY_INTERVAL.as_secs(),
                    "Failed to connect to image API"
                );
                metrics::record_cycle_failure("connection");
                self.shutdown.sleep(CONNECT_RETRY_INTERVAL).await;
                return CycleOutcome::ConnectFailed(RotationError::Connection(e));
            }
            info!("Connected to image API");
            self.connected = true;
        }

        if !self.first_cycle {
            let delay = self.next_download_delay();
            debug!(delay_secs = delay.as_secs(), "Waiting before next download");
            if !self.shutdown.sleep(delay).await {
                return CycleOutcome::Stopped;
            }
        }
        self.first_cycle = false;

        let at_capacity = self.shared.total().await >= self.config.max_pool_size();
        let topic = if at_capacity {
            match self.evict_one().await {
                Ok(topic) => topic,
                Err(e) => return self.abort("eviction", e),
            }
        } else {
            balancer::topic_with_fewest_images(&*self.shared.pool().read().await)
        };
        let Some(topic) = topic else {
            debug!("No topic selected, skipping cycle");
            return CycleOutcome::Skipped;
        };

        let downloaded = match self
            .download_image(&topic)
            .instrument(info_span!("download_image", topic = %topic))
            .await
        {
            Ok(downloaded) => downloaded,
            Err(e) => return self.abort("download", e),
        };
        if self.quota.mark_download(Instant::now()) {
            debug!("First download of the quota window");
        }

        let image = match self.store_image(&topic, downloaded).await {
            Ok(image) => image,
            Err(e) => return self.abort("storage", e),
        };

        let total = self.shared.total().await;
        metrics::record_download(&topic);
        metrics::record_levels(total, self.quota.remaining());
        info!(
            topic = %topic,
            id = %image.id,
            pool_size = total,
            requests_used = self.quota.requests_this_window(),
            "Image downloaded into pool"
        );
        if !self.quota.has_quota_for(REQUESTS_PER_IMAGE_DOWNLOAD) {
            info!(
                max_requests = self.quota.max_requests(),
                "Request quota reached, pausing downloads until the window resets"
            );
        }

        if let Err(e) = self.persist_session().await {
            error!(error = %e, "Failed to back up image data session");
        }

        CycleOutcome::Downloaded(image)
    }

    async fn wait_for_quota_reset(&mut self) -> CycleOutcome {
        let reset = self.quota.maybe_reset(Instant::now());
        metrics::record_levels(self.shared.total().await, self.quota.remaining());
        if !reset {
            debug!(
                used = self.quota.requests_this_window(),
                max = self.quota.max_requests(),
                "Quota exhausted, waiting for the next window"
            );
        }
        // Polling stays coarse: a reset is only acted on after the wait
        self.shutdown.sleep(QUOTA_POLL_INTERVAL).await;
        CycleOutcome::QuotaWait { reset }
    }

    fn abort(&self, reason: &'static str, error: RotationError) -> CycleOutcome {
        warn!(reason, error = %error, "Rotation cycle aborted");
        metrics::record_cycle_failure(reason);
        CycleOutcome::Aborted(error)
    }

    fn next_download_delay(&mut self) -> Duration {
        let jitter = self.rng.random_range(0..=MAX_DOWNLOAD_JITTER_SECS);
        self.config.download_interval() + Duration::from_secs(jitter)
    }

    /// Remove a random image of the fullest topic, file first
    ///
    /// # Returns
    /// Topic the freed slot belongs to
    async fn evict_one(&mut self) -> Result<Option<String>, RotationError> {
        let victim = {
            let pool = self.shared.pool().read().await;
            let Some(topic) = balancer::topic_with_most_images(&pool, &mut self.rng) else {
                return Ok(None);
            };
            pool.images(&topic).choose(&mut self.rng).cloned()
        };
        let Some(victim) = victim else {
            return Ok(None);
        };

        match self.shared.files().remove(&victim.file_path).await? {
            RemoveOutcome::Removed => {}
            RemoveOutcome::AlreadyMissing => warn!(
                path = %victim.file_path.display(),
                "Evicted image file was already gone"
            ),
        }
        self.shared.purge(&victim).await;
        metrics::record_eviction(&victim.topic);
        info!(topic = %victim.topic, id = %victim.id, "Image evicted from pool");
        Ok(Some(victim.topic))
    }

    /// Search, fetch and notify; charges two requests on success
    async fn download_image(&mut self, topic: &str) -> Result<DownloadedImage, RotationError> {
        self.quota.record_request()?;
        metrics::record_api_request("search");
        let search = self
            .api
            .search_random(
                topic,
                self.config.image_width(),
                self.config.image_height(),
                self.config.orientation(),
            )
            .await;
        let candidate = match search {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return Err(RotationError::NoCandidate(topic.to_string())),
            Err(e) => return Err(self.api_failure(e)),
        };

        let attribution = self.referral.attribute(&candidate);
        let bytes = self
            .fetcher
            .fetch(&candidate.image_url)
            .await
            .map_err(RotationError::Download)?;

        self.quota.record_request()?;
        metrics::record_api_request("download");
        if let Err(e) = self.api.notify_download(&candidate.id).await {
            return Err(self.api_failure(e));
        }

        debug!(id = %candidate.id, bytes = bytes.len(), "Photo fetched");
        Ok(DownloadedImage {
            id: candidate.id,
            attribution,
            bytes,
        })
    }

    fn api_failure(&mut self, error: ApiError) -> RotationError {
        if error.requires_reconnect() {
            warn!(error = %error, "Image API rejected credentials, reconnecting next cycle");
            self.connected = false;
        }
        RotationError::Download(error)
    }

    /// Write the bytes under a fresh name and pool the image
    async fn store_image(
        &mut self,
        topic: &str,
        downloaded: DownloadedImage,
    ) -> Result<Image, RotationError> {
        let path = self
            .shared
            .pool()
            .read()
            .await
            .next_file_path(self.config.image_dir(), topic);

        if let Err(e) = self.shared.files().write(&path, &downloaded.bytes).await {
            // Drop any partial file; it is not pooled
            if let Err(cleanup) = self.shared.files().remove(&path).await {
                debug!(error = %cleanup, "Failed to clean up partial image file");
            }
            return Err(e.into());
        }

        let image = Image {
            id: downloaded.id,
            attribution: downloaded.attribution,
            file_path: path,
            topic: topic.to_string(),
        };
        self.shared.insert(image.clone()).await?;
        Ok(image)
    }

    async fn persist_session(&self) -> Result<(), RotationError> {
        let snapshot = self.shared.snapshot().await;
        let path = self.config.session_path();
        tokio::task::spawn_blocking(move || snapshot.save(&path))
            .await
            .map_err(|e| SessionError::IoError(format!("session save task failed: {e}")))??;
        Ok(())
    }
}
