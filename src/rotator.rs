//! Rotator facade
//!
//! [`ImageRotator`] owns the collaborators, restores the previous session at
//! setup, and runs the [`RotationManager`] on a background tokio task until
//! [`ImageRotator::stop`] is called.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{
    ApiCredentials, ApiError, HttpImageFetcher, ImageApi, ImageFetcher, UnsplashClient,
};
use crate::metrics;
use crate::provider::ImageProvider;
use crate::rotation::{ConfigError, ImagePool, RotationManager, RotatorConfig, SharedPool};
use crate::session::{SessionError, SessionSnapshot};
use crate::shutdown::{ShutdownCoordinator, SharedShutdown};
use crate::ServedImage;

/// Facade errors
#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    /// `setup` has not been called
    #[error("rotator is not configured, call setup first")]
    NotConfigured,

    /// The background task is already running
    #[error("rotator is already running")]
    AlreadyRunning,

    /// The background task is not running
    #[error("rotator is not running")]
    NotRunning,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Building an API collaborator failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The background task panicked or was cancelled
    #[error("rotation task failed: {0}")]
    TaskJoin(String),
}

struct RunningTask {
    handle: JoinHandle<()>,
    shutdown: SharedShutdown,
}

struct Session {
    config: Arc<RotatorConfig>,
    shared: Arc<SharedPool>,
    provider: ImageProvider,
}

/// Downloads, rotates and serves random topic images
pub struct ImageRotator {
    api: Arc<dyn ImageApi>,
    fetcher: Arc<dyn ImageFetcher>,
    session: Option<Session>,
    task: Option<RunningTask>,
    seed: Option<u64>,
}

impl ImageRotator {
    /// Create a rotator over custom collaborators
    pub fn new(api: Arc<dyn ImageApi>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            api,
            fetcher,
            session: None,
            task: None,
            seed: None,
        }
    }

    /// Create a rotator talking to the Unsplash API
    pub fn unsplash(credentials: &ApiCredentials) -> Result<Self, RotatorError> {
        let api = Arc::new(UnsplashClient::new(credentials.clone()));
        let fetcher = Arc::new(HttpImageFetcher::new()?);
        Ok(Self::new(api, fetcher))
    }

    /// Seed the manager's random source (jitter and eviction choice)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Apply a configuration and restore the previous session
    ///
    /// A missing or unreadable session file starts an empty pool.
    ///
    /// # Returns
    /// Number of restored images
    pub async fn setup(&mut self, config: RotatorConfig) -> Result<usize, RotatorError> {
        if self.is_running() {
            return Err(RotatorError::AlreadyRunning);
        }
        metrics::describe_metrics();

        let shared = Arc::new(SharedPool::new(ImagePool::new(config.topics())));
        let session_path = config.session_path();
        let restored = match SessionSnapshot::load(&session_path) {
            Ok(snapshot) => shared.restore(&snapshot).await,
            Err(SessionError::NotFound(_)) => {
                info!(path = %session_path.display(), "No previous session, starting empty");
                0
            }
            Err(e) => {
                warn!(error = %e, "Failed to load previous session, starting empty");
                0
            }
        };

        info!(
            topics = ?config.topics(),
            max_pool_size = config.max_pool_size(),
            restored,
            "Rotator configured"
        );
        self.session = Some(Session {
            config: Arc::new(config),
            provider: ImageProvider::new(shared.clone()),
            shared,
        });
        Ok(restored)
    }

    /// Spawn the rotation manager on the current tokio runtime
    pub fn start(&mut self) -> Result<(), RotatorError> {
        let session = self.session.as_ref().ok_or(RotatorError::NotConfigured)?;
        if self.is_running() {
            return Err(RotatorError::AlreadyRunning);
        }

        let shutdown = ShutdownCoordinator::shared();
        let mut manager = RotationManager::new(
            session.config.clone(),
            self.api.clone(),
            self.fetcher.clone(),
            session.shared.clone(),
            shutdown.clone(),
        );
        if let Some(seed) = self.seed {
            manager = manager.with_rng(StdRng::seed_from_u64(seed));
        }
        let handle = tokio::spawn(manager.run());
        self.task = Some(RunningTask { handle, shutdown });
        info!("Rotator started");
        Ok(())
    }

    /// Ask the manager to stop and wait for its current cycle to finish
    pub async fn stop(&mut self) -> Result<(), RotatorError> {
        let task = self.task.take().ok_or(RotatorError::NotRunning)?;
        task.shutdown.request_shutdown();
        task.handle
            .await
            .map_err(|e| RotatorError::TaskJoin(e.to_string()))?;
        info!("Rotator stopped");
        Ok(())
    }

    /// Whether the background task is alive
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Random pooled image, or `None` before setup or while the pool is empty
    pub async fn get_random_image(&self) -> Option<ServedImage> {
        self.session.as_ref()?.provider.get_random_image().await
    }

    /// Number of pooled images (0 before setup)
    pub async fn pool_size(&self) -> usize {
        match &self.session {
            Some(session) => session.shared.total().await,
            None => 0,
        }
    }

    /// Active configuration, once set up
    pub fn config(&self) -> Option<&RotatorConfig> {
        self.session.as_ref().map(|session| session.config.as_ref())
    }

    /// Provider handle that can be cloned into other tasks
    pub fn provider(&self) -> Option<ImageProvider> {
        self.session.as_ref().map(|session| session.provider.clone())
    }
}

impl Drop for ImageRotator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.shutdown.request_shutdown();
        }
    }
}
