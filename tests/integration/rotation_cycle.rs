//! Integration tests for the rotation cycle: growth, eviction and aborted cycles

use super::fakes::{self, FakeApi, FakeFetcher};
use random_image_downloader::rotation::{
    CycleOutcome, RotationError, RotationManager, RotationState,
};
use random_image_downloader::{Image, QuotaMode};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

async fn expect_download(manager: &mut RotationManager) -> Image {
    match manager.run_cycle().await {
        CycleOutcome::Downloaded(image) => image,
        other => panic!("expected a download, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_eviction_at_cap_keeps_pool_bounded() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), Some(2));
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 9);

    let first = expect_download(&mut manager).await;
    let second = expect_download(&mut manager).await;
    assert_eq!(shared.total().await, 2);

    let third = expect_download(&mut manager).await;
    assert_eq!(shared.total().await, 2);

    let pooled: HashSet<String> = shared
        .pool()
        .read()
        .await
        .images("x")
        .iter()
        .map(|image| image.id.clone())
        .collect();
    assert!(pooled.contains(&third.id));
    let evicted = if pooled.contains(&first.id) { &second } else { &first };
    assert!(!pooled.contains(&evicted.id));

    // The evicted image's bytes are gone from disk; the pooled ones are intact
    let on_disk = fakes::stored_images(dir.path());
    assert_eq!(on_disk.len(), 2);
    assert!(!on_disk.contains(&fakes::photo_bytes(&evicted.id).to_vec()));
    for image in shared.pool().read().await.images("x") {
        assert_eq!(
            std::fs::read(&image.file_path).unwrap(),
            fakes::photo_bytes(&image.id).to_vec()
        );
    }
    assert!(shared.pool().read().await.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn test_growth_balances_topics() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["a", "b", "c"], QuotaMode::Custom(50), Some(6));
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 1);

    let mut order = Vec::new();
    for _ in 0..6 {
        order.push(expect_download(&mut manager).await.topic);
    }
    // Ties go to the last configured topic
    assert_eq!(order, vec!["c", "b", "a", "c", "b", "a"]);

    let pool = shared.pool().read().await;
    let counts: Vec<(&str, usize)> = pool.counts().collect();
    assert_eq!(counts, vec![("a", 2), ("b", 2), ("c", 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_refills_the_evicted_topic() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["a", "b", "c"], QuotaMode::Custom(50), Some(3));
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 21);

    for _ in 0..10 {
        expect_download(&mut manager).await;
        let pool = shared.pool().read().await;
        assert!(pool.total() <= 3);
        assert!(pool.is_consistent());
    }
    let pool = shared.pool().read().await;
    let counts: Vec<(&str, usize)> = pool.counts().collect();
    assert_eq!(counts, vec![("a", 1), ("b", 1), ("c", 1)]);
    assert_eq!(fakes::stored_images(dir.path()).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_of_externally_deleted_file_succeeds() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), Some(1));
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 4);

    let first = expect_download(&mut manager).await;
    std::fs::remove_file(&first.file_path).unwrap();

    let second = expect_download(&mut manager).await;
    assert_eq!(shared.total().await, 1);
    assert_eq!(shared.pool().read().await.images("x")[0].id, second.id);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_aborts_without_pool_change() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), None);
    let fetcher = FakeFetcher::new();
    fetcher.fail.store(true, Ordering::SeqCst);
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), fetcher, 2);

    assert!(matches!(
        manager.run_cycle().await,
        CycleOutcome::Aborted(RotationError::Download(_))
    ));
    assert_eq!(shared.total().await, 0);
    // The search was sent and stays charged
    assert_eq!(manager.quota().requests_this_window(), 1);
    assert!(fakes::stored_images(dir.path()).is_empty());
    assert_eq!(manager.state(), RotationState::ConnectedIdle);
}

#[tokio::test(start_paused = true)]
async fn test_notify_failure_discards_fetched_bytes() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), None);
    let api = FakeApi::new();
    api.fail_notify.store(true, Ordering::SeqCst);
    let (mut manager, shared) = fakes::manager(config, api, FakeFetcher::new(), 2);

    assert!(matches!(manager.run_cycle().await, CycleOutcome::Aborted(_)));
    assert_eq!(shared.total().await, 0);
    assert_eq!(manager.quota().requests_this_window(), 2);
    assert!(fakes::stored_images(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_candidate_aborts_cycle() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), None);
    let api = FakeApi::new();
    api.no_candidate.store(true, Ordering::SeqCst);
    let fetcher = FakeFetcher::new();
    let (mut manager, shared) = fakes::manager(config, api, fetcher.clone(), 2);

    assert!(matches!(
        manager.run_cycle().await,
        CycleOutcome::Aborted(RotationError::NoCandidate(topic)) if topic == "x"
    ));
    assert_eq!(shared.total().await, 0);
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_retries_next_cycle() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), None);
    let api = FakeApi::new();
    api.refuse_connect.store(true, Ordering::SeqCst);
    let (mut manager, shared) = fakes::manager(config, api.clone(), FakeFetcher::new(), 2);

    assert!(matches!(manager.run_cycle().await, CycleOutcome::ConnectFailed(_)));
    assert!(matches!(manager.run_cycle().await, CycleOutcome::ConnectFailed(_)));
    assert_eq!(api.quota_calls(), 0);

    api.refuse_connect.store(false, Ordering::SeqCst);
    expect_download(&mut manager).await;
    assert_eq!(api.connects.load(Ordering::SeqCst), 3);
    assert_eq!(shared.total().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_with_repeated_photo_ids_keeps_disk_and_pool_in_step() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), Some(2));
    let api = FakeApi::new();
    api.repeat_id.store(true, Ordering::SeqCst);
    let (mut manager, shared) = fakes::manager(config, api, FakeFetcher::new(), 3);

    for _ in 0..6 {
        expect_download(&mut manager).await;
        let pool = shared.pool().read().await;
        assert_eq!(pool.total(), pool.images("x").len());
        assert!(pool.is_consistent());
        // Every pooled entry points at a file that is still on disk
        for image in pool.images("x") {
            assert_eq!(image.id, "same");
            assert!(image.file_path.exists(), "{} missing", image.file_path.display());
        }
        assert_eq!(fakes::stored_images(dir.path()).len(), pool.total());
    }
    assert_eq!(shared.total().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_delete_failure_aborts_without_pool_change() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), Some(1));
    let api = FakeApi::new();
    let (mut manager, shared) = fakes::manager(config, api.clone(), FakeFetcher::new(), 4);

    let first = expect_download(&mut manager).await;
    // A directory where the image file was cannot be deleted as a file
    std::fs::remove_file(&first.file_path).unwrap();
    std::fs::create_dir(&first.file_path).unwrap();
    let searches = api.searches.load(Ordering::SeqCst);

    assert!(matches!(
        manager.run_cycle().await,
        CycleOutcome::Aborted(RotationError::FileIo(_))
    ));
    assert_eq!(shared.total().await, 1);
    assert!(shared.pool().read().await.contains(&first));
    assert_eq!(api.searches.load(Ordering::SeqCst), searches);
    assert_eq!(manager.state(), RotationState::ConnectedIdle);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_save_failure_still_counts_as_download() {
    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["x"], QuotaMode::Custom(50), None);
    // The snapshot cannot replace a directory
    std::fs::create_dir(config.session_path()).unwrap();
    let (mut manager, shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 6);

    let image = expect_download(&mut manager).await;
    assert_eq!(shared.total().await, 1);
    assert_eq!(
        std::fs::read(&image.file_path).unwrap(),
        fakes::photo_bytes(&image.id).to_vec()
    );
    assert_eq!(manager.quota().requests_this_window(), 2);
}
