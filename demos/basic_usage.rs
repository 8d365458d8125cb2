//! Basic rotator usage
//!
//! Reads its settings from the environment:
//!
//! - `UNSPLASH_ACCESS_KEY` / `UNSPLASH_SECRET_KEY` (required access key)
//! - `ROTATOR_APP_NAME` (default `random_image_demo`)
//! - `ROTATOR_QUOTA`: `demo`, `production` or requests per hour (default `demo`)
//! - `ROTATOR_IMAGE_DIR` (default `images`)
//! - `ROTATOR_TOPICS`: comma separated (default `water,fire,lightning`)
//! - `ROTATOR_MAX_POOL_SIZE` (optional)
//!
//! Run with `cargo run --example basic_usage`, stop with Ctrl+C.

use anyhow::Context;
use random_image_downloader::{ApiCredentials, ImageRotator, QuotaMode, RotatorConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("random_image_downloader=info,basic_usage=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn load_config() -> anyhow::Result<RotatorConfig> {
    let credentials = ApiCredentials::new(
        std::env::var("UNSPLASH_ACCESS_KEY").context("UNSPLASH_ACCESS_KEY is not set")?,
        env_or("UNSPLASH_SECRET_KEY", ""),
    );
    let quota_mode: QuotaMode = env_or("ROTATOR_QUOTA", "demo")
        .parse()
        .map_err(anyhow::Error::msg)?;
    let topics: Vec<String> = env_or("ROTATOR_TOPICS", "water,fire,lightning")
        .split(',')
        .map(|topic| topic.trim().to_string())
        .filter(|topic| !topic.is_empty())
        .collect();

    let mut builder = RotatorConfig::builder(env_or("ROTATOR_APP_NAME", "random_image_demo"), credentials)
        .quota_mode(quota_mode)
        .image_dir(env_or("ROTATOR_IMAGE_DIR", "images"))
        .topics(topics);
    if let Ok(max) = std::env::var("ROTATOR_MAX_POOL_SIZE") {
        builder = builder.max_pool_size(max.parse().context("invalid ROTATOR_MAX_POOL_SIZE")?);
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    let mut rotator = ImageRotator::unsplash(config.credentials())?;
    let restored = rotator.setup(config).await?;
    tracing::info!(restored, "Rotator ready");
    rotator.start()?;

    let mut poll = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Ctrl+C received, stopping rotator...");
                break;
            }
            _ = poll.tick() => {
                match rotator.get_random_image().await {
                    Some(image) => tracing::info!(
                        topic = %image.topic,
                        id = %image.id,
                        size = image.image.len(),
                        attribution = %image.attribution,
                        "Got random image"
                    ),
                    None => tracing::info!(pool_size = rotator.pool_size().await, "No image available yet"),
                }
            }
        }
    }

    rotator.stop().await?;
    Ok(())
}
