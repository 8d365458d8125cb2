//! Integration tests for serving images while files disappear underneath

use super::fakes::{self, FakeApi, FakeFetcher};
use random_image_downloader::rotation::{CycleOutcome, ImagePool, SharedPool};
use random_image_downloader::{Image, ImageProvider, QuotaMode};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn test_serves_downloaded_images_with_attribution() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["water"], QuotaMode::Custom(50), None);
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 5);
    let downloaded = match manager.run_cycle().await {
        CycleOutcome::Downloaded(image) => image,
        other => panic!("unexpected {other:?}"),
    };

    let served = ImageProvider::new(shared).get_random_image().await.unwrap();
    assert_eq!(served.id, downloaded.id);
    assert_eq!(served.topic, "water");
    assert_eq!(served.image, fakes::photo_bytes(&downloaded.id));
    assert!(served
        .attribution
        .contains("https://unsplash.com/@analens?utm_source=rotation_tests&utm_medium=referral"));
}

#[tokio::test(start_paused = true)]
async fn test_externally_deleted_file_is_purged_exactly_once() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["water", "fire"], QuotaMode::Custom(50), None);
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 5);
    for _ in 0..4 {
        assert!(matches!(manager.run_cycle().await, CycleOutcome::Downloaded(_)));
    }
    let victim = shared.pool().read().await.images("fire")[0].clone();
    std::fs::remove_file(&victim.file_path).unwrap();

    let provider = ImageProvider::new(shared.clone());
    let mut misses = 0;
    for _ in 0..100 {
        if provider.get_random_image().await.is_none() {
            misses += 1;
        }
    }
    assert_eq!(misses, 1);
    assert_eq!(shared.total().await, 3);
    let pool = shared.pool().read().await;
    assert_eq!(pool.topic_count("fire"), 1);
    assert!(pool.is_consistent());
    assert!(!pool.contains_path(&victim.file_path));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_purge_each_stale_image_once() {
    let dir = TempDir::new().unwrap();
    let shared = Arc::new(SharedPool::new(ImagePool::new(&["water", "fire"])));
    for index in 0..6 {
        let topic = if index % 2 == 0 { "water" } else { "fire" };
        let image = Image {
            id: format!("photo-{index}"),
            attribution: String::new(),
            file_path: dir.path().join(format!("{topic}_{index}.jpg")),
            topic: topic.to_string(),
        };
        // Two of the six files never reach the disk
        if index < 4 {
            std::fs::write(&image.file_path, image.id.as_bytes()).unwrap();
        }
        shared.insert(image).await.unwrap();
    }

    let provider = ImageProvider::new(shared.clone());
    let mut readers = Vec::new();
    for _ in 0..8 {
        let provider = provider.clone();
        readers.push(tokio::spawn(async move {
            let mut served = 0;
            for _ in 0..50 {
                if let Some(image) = provider.get_random_image().await {
                    assert_eq!(&image.image[..], image.id.as_bytes());
                    served += 1;
                }
            }
            served
        }));
    }
    let mut misses = 0;
    for reader in readers {
        misses += 50 - reader.await.unwrap();
    }

    // Concurrent readers can pick the same stale image before it is purged,
    // but the pool only loses it once
    assert!(misses >= 2);
    assert_eq!(shared.total().await, 4);
    assert!(shared.pool().read().await.is_consistent());
    assert_eq!(shared.files().tracked_paths().await, 4);
}
