//! Rotation metrics
//!
//! Emits counters and gauges through the `metrics` facade. Nothing is
//! recorded anywhere until the embedding application installs a recorder
//! (for example a Prometheus exporter).

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        "rotation_images_downloaded_total",
        Unit::Count,
        "Total number of images downloaded into the pool"
    );
    describe_counter!(
        "rotation_images_evicted_total",
        Unit::Count,
        "Total number of images evicted to make room for new ones"
    );
    describe_counter!(
        "rotation_images_purged_total",
        Unit::Count,
        "Total number of pooled images purged because their file was unreadable"
    );
    describe_counter!(
        "rotation_download_failures_total",
        Unit::Count,
        "Total number of aborted rotation cycles"
    );
    describe_counter!(
        "api_requests_total",
        Unit::Count,
        "Total number of requests charged against the image API quota"
    );
    describe_gauge!(
        "rotation_pool_size",
        Unit::Count,
        "Images currently in the pool"
    );
    describe_gauge!(
        "api_quota_remaining",
        Unit::Count,
        "Requests left in the current quota window"
    );
}

/// Record a successful download for `topic`
pub fn record_download(topic: &str) {
    counter!("rotation_images_downloaded_total", "topic" => topic.to_string()).increment(1);
}

/// Record an eviction from `topic`
pub fn record_eviction(topic: &str) {
    counter!("rotation_images_evicted_total", "topic" => topic.to_string()).increment(1);
}

/// Record a purge of an unreadable image from `topic`
pub fn record_purge(topic: &str) {
    counter!("rotation_images_purged_total", "topic" => topic.to_string()).increment(1);
}

/// Record an aborted cycle
pub fn record_cycle_failure(reason: &'static str) {
    counter!("rotation_download_failures_total", "reason" => reason).increment(1);
}

/// Record a request charged against the quota
pub fn record_api_request(endpoint: &'static str) {
    counter!("api_requests_total", "endpoint" => endpoint).increment(1);
}

/// Update pool size and remaining quota gauges
pub fn record_levels(pool_size: usize, quota_remaining: u32) {
    gauge!("rotation_pool_size").set(pool_size as f64);
    gauge!("api_quota_remaining").set(quota_remaining as f64);
}
