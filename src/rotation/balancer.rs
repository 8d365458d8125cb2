//! Topic selection keeping per-topic image counts balanced
//!
//! Growth targets the topic with the fewest images; eviction targets the topic
//! with the most. Random tie-breaking takes the caller's RNG so tests can seed it.

use rand::seq::IndexedRandom;
use rand::Rng;

use super::pool::ImagePool;

/// Topic with the most images, ties broken uniformly at random
///
/// Returns `None` when no topic is configured.
pub fn topic_with_most_images<R: Rng + ?Sized>(pool: &ImagePool, rng: &mut R) -> Option<String> {
    let most = pool.counts().map(|(_, count)| count).max()?;
    let tied: Vec<&str> = pool
        .counts()
        .filter(|(_, count)| *count == most)
        .map(|(topic, _)| topic)
        .collect();
    tied.choose(rng).map(|topic| topic.to_string())
}

/// Topic with the fewest images
///
/// Scans topics in configuration order with a less-or-equal comparison, so
/// among tied topics the last one wins. Returns `None` when no topic is configured.
pub fn topic_with_fewest_images(pool: &ImagePool) -> Option<String> {
    let mut fewest: Option<(&str, usize)> = None;
    for (topic, count) in pool.counts() {
        match fewest {
            Some((_, least)) if count > least => {}
            _ => fewest = Some((topic, count)),
        }
    }
    fewest.map(|(topic, _)| topic.to_string())
}
