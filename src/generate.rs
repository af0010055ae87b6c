//! Test data generation
//!
//! Produces `<time>,link-<n>` lines with timestamps spread uniformly over a
//! recent window, for exercising ingestion with realistic volumes.

use crate::error::{Error, Result};
use rand::Rng;
use std::ops::RangeInclusive;

/// Parameters for generated input
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of lines to produce
    pub count: usize,
    /// Timestamps fall in `[now - window_secs, now]`
    pub window_secs: i64,
    /// Link numbers are drawn from this range
    pub links: RangeInclusive<u32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            count: 50_000,
            window_secs: 5 * 3600,
            links: 1..=1001,
        }
    }
}

/// Generate lines ending at `now` (seconds since the epoch)
///
/// Fails with `InvalidConfiguration` when the link range is empty.
pub fn generate_lines(config: &GeneratorConfig, now: i64) -> Result<Vec<String>> {
    if config.links.is_empty() {
        return Err(Error::InvalidConfiguration(format!(
            "link range {}..={} is empty",
            config.links.start(),
            config.links.end()
        )));
    }

    let mut rng = rand::rng();
    let start = now.saturating_sub(config.window_secs.max(0));

    let lines = (0..config.count)
        .map(|_| {
            let time = rng.random_range(start..=now);
            let link = rng.random_range(config.links.clone());
            format!("{},link-{}", time, link)
        })
        .collect();
    Ok(lines)
}
