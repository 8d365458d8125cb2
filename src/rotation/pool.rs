//! Rotation pool: cached images partitioned by topic
//!
//! [`ImagePool`] is plain data. The per-topic vectors are authoritative and
//! the running total is only ever changed together with them, inside the
//! same `&mut self` call. [`SharedPool`] puts the pool behind one coarse
//! `RwLock` and pairs it with the per-path [`FileStore`] used for file I/O,
//! so pool-membership changes never wait on disk access.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::session::SessionSnapshot;
use crate::storage::FileStore;
use crate::Image;

/// Pool mutation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The image topic is not configured
    #[error("unknown topic {0:?}")]
    UnknownTopic(String),

    /// Another image already uses this file
    #[error("file path already in pool: {0}")]
    DuplicatePath(PathBuf),
}

/// Cached images per topic with a maintained running total
#[derive(Debug, Clone)]
pub struct ImagePool {
    topics: Vec<String>,
    images: HashMap<String, Vec<Image>>,
    total: usize,
}

impl ImagePool {
    /// Create an empty pool for a fixed topic list
    pub fn new<S: AsRef<str>>(topics: &[S]) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(topics.len());
        for topic in topics {
            let topic = topic.as_ref();
            if !unique.iter().any(|t| t == topic) {
                unique.push(topic.to_string());
            }
        }
        let images = unique.iter().map(|t| (t.clone(), Vec::new())).collect();
        Self {
            topics: unique,
            images,
            total: 0,
        }
    }

    /// Configured topics, in configuration order
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Total number of pooled images
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether the pool holds no image
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of images for `topic`
    pub fn topic_count(&self, topic: &str) -> usize {
        self.images.get(topic).map_or(0, Vec::len)
    }

    /// `(topic, count)` pairs in configuration order
    pub fn counts(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.topics
            .iter()
            .map(move |topic| (topic.as_str(), self.topic_count(topic)))
    }

    /// Images of `topic`
    pub fn images(&self, topic: &str) -> &[Image] {
        self.images.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every pooled image, grouped by topic
    pub fn iter(&self) -> impl Iterator<Item = &Image> + '_ {
        self.topics.iter().flat_map(move |topic| self.images(topic).iter())
    }

    /// Whether some pooled image is stored at `path`
    pub fn contains_path(&self, path: &Path) -> bool {
        self.iter().any(|image| image.file_path == path)
    }

    /// Add an image to its topic
    pub fn insert(&mut self, image: Image) -> Result<(), PoolError> {
        if self.contains_path(&image.file_path) {
            return Err(PoolError::DuplicatePath(image.file_path));
        }
        let images = self
            .images
            .get_mut(&image.topic)
            .ok_or_else(|| PoolError::UnknownTopic(image.topic.clone()))?;
        images.push(image);
        self.total += 1;
        Ok(())
    }

    /// Whether this exact image (same id, attribution and file) is pooled
    pub fn contains(&self, image: &Image) -> bool {
        self.images(&image.topic).contains(image)
    }

    /// Remove the pooled entry stored at `image.file_path`
    ///
    /// Photo ids can repeat across downloads, so the file path identifies the
    /// entry; the id must still match so a reused path is left alone.
    ///
    /// # Returns
    /// The removed image, or `None` when it is not (or no longer) pooled
    pub fn remove(&mut self, image: &Image) -> Option<Image> {
        let images = self.images.get_mut(&image.topic)?;
        let index = images
            .iter()
            .position(|pooled| pooled.file_path == image.file_path && pooled.id == image.id)?;
        let removed = images.swap_remove(index);
        self.total -= 1;
        Some(removed)
    }

    /// Path for the next download of `topic`: `{topic}_{count}.jpg`, advancing
    /// the index past names still held by pooled images
    pub fn next_file_path(&self, dir: &Path, topic: &str) -> PathBuf {
        let mut index = self.topic_count(topic);
        loop {
            let candidate = dir.join(format!("{topic}_{index}.jpg"));
            if !self.contains_path(&candidate) {
                return candidate;
            }
            index += 1;
        }
    }

    /// Whether the running total matches the per-topic sets
    pub fn is_consistent(&self) -> bool {
        let sum: usize = self.images.values().map(Vec::len).sum();
        sum == self.total && self.images.len() == self.topics.len()
    }

    /// Replace the pool contents with a stored snapshot
    ///
    /// Only configured topics are restored. Snapshot topics that are no longer
    /// configured are dropped, as are entries reusing an already restored path.
    ///
    /// # Returns
    /// Number of restored images
    pub fn restore(&mut self, snapshot: &SessionSnapshot) -> usize {
        for images in self.images.values_mut() {
            images.clear();
        }
        self.total = 0;

        for (topic, stored) in snapshot.topics() {
            if !self.images.contains_key(topic) {
                warn!(
                    topic = %topic,
                    images = stored.len(),
                    "Dropping stored images of a topic that is no longer configured"
                );
                continue;
            }
            for entry in stored {
                if let Err(e) = self.insert(entry.clone().into_image(topic)) {
                    warn!(error = %e, "Skipping stored image");
                }
            }
        }

        info!(images = self.total, "Restored previous image data session");
        self.total
    }

    /// Serialize the pool for persistence
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::new();
        for topic in &self.topics {
            snapshot.add_topic(topic);
            for image in self.images(topic) {
                snapshot.add_image(image);
            }
        }
        snapshot
    }
}

impl PartialEq for ImagePool {
    /// Same topics and the same images per topic, in any order
    fn eq(&self, other: &Self) -> bool {
        self.topics == other.topics
            && self.total == other.total
            && self.topics.iter().all(|topic| {
                let mine: HashSet<&Image> = self.images(topic).iter().collect();
                let theirs: HashSet<&Image> = other.images(topic).iter().collect();
                mine == theirs
            })
    }
}

/// Pool state shared between the rotation manager and image readers
#[derive(Debug)]
pub struct SharedPool {
    pool: RwLock<ImagePool>,
    files: FileStore,
}

impl SharedPool {
    /// Wrap a pool
    pub fn new(pool: ImagePool) -> Self {
        Self {
            pool: RwLock::new(pool),
            files: FileStore::new(),
        }
    }

    /// Coarse lock guarding pool membership and counters
    pub fn pool(&self) -> &RwLock<ImagePool> {
        &self.pool
    }

    /// Per-path locked file access
    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Total number of pooled images
    pub async fn total(&self) -> usize {
        self.pool.read().await.total()
    }

    /// Replace the pool contents from a snapshot and register a file lock per image
    pub async fn restore(&self, snapshot: &SessionSnapshot) -> usize {
        let paths: Vec<PathBuf> = {
            let mut pool = self.pool.write().await;
            pool.restore(snapshot);
            pool.iter().map(|image| image.file_path.clone()).collect()
        };
        for path in &paths {
            self.files.register(path).await;
        }
        paths.len()
    }

    /// Add a freshly stored image and register its file lock
    pub async fn insert(&self, image: Image) -> Result<(), PoolError> {
        let path = image.file_path.clone();
        self.pool.write().await.insert(image)?;
        self.files.register(&path).await;
        Ok(())
    }

    /// Remove an image whose file is gone or evicted
    ///
    /// The file lock is dropped unless another pooled image holds the path.
    ///
    /// # Returns
    /// Whether the image was still pooled
    pub async fn purge(&self, image: &Image) -> bool {
        let (removed, still_held) = {
            let mut pool = self.pool.write().await;
            let removed = pool.remove(image).is_some();
            (removed, pool.contains_path(&image.file_path))
        };
        if !still_held {
            self.files.forget(&image.file_path).await;
        }
        if removed {
            debug!(topic = %image.topic, id = %image.id, "Image removed from pool");
        }
        removed
    }

    /// Snapshot of the current pool
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.pool.read().await.snapshot()
    }
}
