//! In-process collaborators for driving the rotation loop without a network

use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use random_image_downloader::api::{ApiError, ApiResult, PhotoCandidate};
use random_image_downloader::rotation::{ImagePool, RotationManager, SharedPool};
use random_image_downloader::shutdown::ShutdownCoordinator;
use random_image_downloader::{
    ApiCredentials, ImageApi, ImageFetcher, Orientation, QuotaMode, RotatorConfig,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Image API returning a fresh photo per search and counting every call
#[derive(Default)]
pub struct FakeApi {
    pub connects: AtomicUsize,
    pub searches: AtomicUsize,
    pub notifications: AtomicUsize,
    pub refuse_connect: AtomicBool,
    pub no_candidate: AtomicBool,
    pub fail_notify: AtomicBool,
    /// Answer every search with the same photo id (the URL stays unique)
    pub repeat_id: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Requests that count against the quota
    pub fn quota_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst) + self.notifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageApi for FakeApi {
    async fn connect(&self) -> ApiResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(ApiError::NetworkError("connection refused".to_string()));
        }
        Ok(())
    }

    async fn search_random(
        &self,
        topic: &str,
        _width: u32,
        _height: u32,
        _orientation: Orientation,
    ) -> ApiResult<Option<PhotoCandidate>> {
        let n = self.searches.fetch_add(1, Ordering::SeqCst);
        if self.no_candidate.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let unique = format!("{topic}-{n}");
        let id = if self.repeat_id.load(Ordering::SeqCst) {
            "same".to_string()
        } else {
            unique.clone()
        };
        Ok(Some(PhotoCandidate {
            image_url: format!("https://images.test/{unique}.jpg"),
            id,
            photographer_name: "Ana Lens".to_string(),
            photographer_profile: "https://unsplash.com/@analens".to_string(),
        }))
    }

    async fn notify_download(&self, id: &str) -> ApiResult<()> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                url: format!("https://api.test/photos/{id}/download"),
            });
        }
        Ok(())
    }
}

/// Fetcher answering with bytes unique to the photo URL
#[derive(Default)]
pub struct FakeFetcher {
    pub fetches: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> ApiResult<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        Ok(photo_bytes_for_url(url))
    }
}

pub fn photo_bytes_for_url(url: &str) -> Bytes {
    Bytes::from(format!("JPEG:{url}").into_bytes())
}

/// Bytes the fake fetcher serves for photo `id`
pub fn photo_bytes(id: &str) -> Bytes {
    photo_bytes_for_url(&format!("https://images.test/{id}.jpg"))
}

pub fn config(dir: &Path, topics: &[&str], quota: QuotaMode, cap: Option<u32>) -> RotatorConfig {
    let mut builder = RotatorConfig::builder("rotation_tests", ApiCredentials::new("key", "secret"))
        .quota_mode(quota)
        .image_dir(dir)
        .topics(topics.iter().copied());
    if let Some(cap) = cap {
        builder = builder.max_pool_size(cap);
    }
    builder.build().unwrap()
}

pub fn manager(
    config: RotatorConfig,
    api: Arc<FakeApi>,
    fetcher: Arc<FakeFetcher>,
    seed: u64,
) -> (RotationManager, Arc<SharedPool>) {
    let shared = Arc::new(SharedPool::new(ImagePool::new(config.topics())));
    let manager = RotationManager::new(
        Arc::new(config),
        api,
        fetcher,
        shared.clone(),
        ShutdownCoordinator::shared(),
    )
    .with_rng(StdRng::seed_from_u64(seed));
    (manager, shared)
}

/// Contents of every `.jpg` file in `dir`
pub fn stored_images(dir: &Path) -> Vec<Vec<u8>> {
    let mut contents = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "jpg") {
            contents.push(std::fs::read(&path).unwrap());
        }
    }
    contents
}
