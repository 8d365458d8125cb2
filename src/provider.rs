//! Random image retrieval for external callers
//!
//! Readers only take the pool lock long enough to pick an image; the file
//! itself is read under its per-path lock. An image whose file cannot be read
//! is purged from the pool so the next call does not trip over it again.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics;
use crate::rotation::{ImagePool, SharedPool};
use crate::{Image, ServedImage};

/// Serves random pooled images, safe to call from any number of tasks
#[derive(Debug, Clone)]
pub struct ImageProvider {
    shared: Arc<SharedPool>,
}

impl ImageProvider {
    /// Create a provider reading from `shared`
    pub fn new(shared: Arc<SharedPool>) -> Self {
        Self { shared }
    }

    /// Pick a random image and read its bytes
    ///
    /// A topic is drawn uniformly among topics holding at least one image,
    /// then an image uniformly within it.
    ///
    /// # Returns
    /// `None` when the pool is empty, the chosen file could not be read, or
    /// the image was rotated out while its file was being read
    pub async fn get_random_image(&self) -> Option<ServedImage> {
        let image = {
            let pool = self.shared.pool().read().await;
            pick_random_image(&pool, &mut rand::rng())?
        };

        match self.shared.files().read(&image.file_path).await {
            Ok(_) if !self.shared.pool().read().await.contains(&image) => {
                // The file name may already hold a newer image's bytes
                debug!(topic = %image.topic, id = %image.id, "Image rotated out during read");
                None
            }
            Ok(bytes) => {
                debug!(topic = %image.topic, id = %image.id, size = bytes.len(), "Serving image");
                Some(ServedImage {
                    attribution: image.attribution,
                    id: image.id,
                    image: bytes,
                    topic: image.topic,
                })
            }
            Err(e) => {
                warn!(
                    error = %e,
                    topic = %image.topic,
                    id = %image.id,
                    "Image file unreadable, purging it from the pool"
                );
                if self.shared.purge(&image).await {
                    metrics::record_purge(&image.topic);
                }
                None
            }
        }
    }
}

/// Uniform topic among non-empty topics, then a uniform image within it
pub fn pick_random_image<R: Rng + ?Sized>(pool: &ImagePool, rng: &mut R) -> Option<Image> {
    let topics: Vec<&str> = pool
        .counts()
        .filter(|(_, count)| *count > 0)
        .map(|(topic, _)| topic)
        .collect();
    let topic = topics.choose(rng)?;
    pool.images(topic).choose(rng).cloned()
}
