//! Integration tests for logging and tracing

use super::fakes::{self, FakeApi, FakeFetcher};
use random_image_downloader::rotation::CycleOutcome;
use random_image_downloader::QuotaMode;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

#[test]
fn test_tracing_subscriber_initialization() {
    // try_init fails harmlessly when another test installed a subscriber first
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("random_image_downloader=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[test]
fn test_tracing_json_format() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("random_image_downloader=info"))
        .with_test_writer()
        .try_init();
}

#[test]
fn test_env_filter_parsing() {
    for directive in [
        "info",
        "random_image_downloader=debug",
        "warn,random_image_downloader::rotation=trace",
    ] {
        assert!(EnvFilter::try_new(directive).is_ok(), "{directive}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_rotation_cycle_logs_under_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("random_image_downloader=trace"))
        .with_test_writer()
        .try_init();

    let dir = TempDir::new().unwrap();
    let config = fakes::config(dir.path(), &["water"], QuotaMode::Custom(4), Some(1));
    let (mut manager, _shared) = fakes::manager(config, FakeApi::new(), FakeFetcher::new(), 0);

    // Download, evict-and-download, then quota wait: every path logs without panicking
    assert!(matches!(manager.run_cycle().await, CycleOutcome::Downloaded(_)));
    assert!(matches!(manager.run_cycle().await, CycleOutcome::Downloaded(_)));
    assert!(matches!(manager.run_cycle().await, CycleOutcome::QuotaWait { .. }));
}
