use std::time::Duration;

use crate::ranking::RankWeights;
use crate::schedule::DEFAULT_REVIEW_OFFSETS_MIN;

const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
const DEFAULT_SYNC_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Engine configuration. `from_env` reads overrides; everything has a
/// sensible default so tests construct it directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote resource name review items live under.
    pub resource: String,
    /// Spaced-repetition offsets in minutes from the first wrong answer.
    pub review_offsets_min: Vec<i64>,
    pub cache_ttl: Duration,
    /// Concurrency bound for batch sync dispatch.
    pub sync_concurrency: usize,
    /// Per-mutation remote timeout.
    pub sync_timeout: Duration,
    /// Minimum spacing between dispatches; zero disables pacing.
    pub dispatch_spacing: Duration,
    /// Mastered items untouched for this long are swept.
    pub retention_days: i64,
    /// Whether a wrong answer on an item with an exhausted schedule
    /// restarts the sequence from a new first-review time.
    pub restart_schedule_on_relapse: bool,
    pub rank_weights: RankWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resource: "review_items".to_string(),
            review_offsets_min: DEFAULT_REVIEW_OFFSETS_MIN.to_vec(),
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            sync_concurrency: crate::sync::DEFAULT_CONCURRENCY,
            sync_timeout: Duration::from_millis(DEFAULT_SYNC_TIMEOUT_MS),
            dispatch_spacing: Duration::ZERO,
            retention_days: DEFAULT_RETENTION_DAYS,
            restart_schedule_on_relapse: true,
            rank_weights: RankWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let review_offsets_min = std::env::var("REVIEW_OFFSETS_MIN")
            .ok()
            .and_then(|raw| parse_offsets(&raw))
            .unwrap_or(defaults.review_offsets_min);

        let cache_ttl = env_u64("CACHE_TTL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.cache_ttl);

        let sync_concurrency = env_u64("SYNC_CONCURRENCY")
            .map(|c| (c as usize).max(1))
            .unwrap_or(defaults.sync_concurrency);

        let sync_timeout = env_u64("SYNC_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.sync_timeout);

        let dispatch_spacing = env_u64("SYNC_DISPATCH_SPACING_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.dispatch_spacing);

        let retention_days = env_u64("RETENTION_DAYS")
            .map(|d| d as i64)
            .unwrap_or(defaults.retention_days);

        let restart_schedule_on_relapse = std::env::var("RESTART_SCHEDULE_ON_RELAPSE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.restart_schedule_on_relapse);

        Self {
            resource: std::env::var("REVIEW_RESOURCE").unwrap_or(defaults.resource),
            review_offsets_min,
            cache_ttl,
            sync_concurrency,
            sync_timeout,
            dispatch_spacing,
            retention_days,
            restart_schedule_on_relapse,
            rank_weights: RankWeights::default(),
        }
    }
}

fn parse_offsets(raw: &str) -> Option<Vec<i64>> {
    let offsets: Vec<i64> = raw
        .split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect();
    if offsets.is_empty() {
        None
    } else {
        Some(offsets)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let config = EngineConfig::default();
        assert_eq!(config.review_offsets_min, vec![1, 10, 60, 1440, 4320, 10080]);
        assert_eq!(config.cache_ttl, Duration::from_millis(300_000));
        assert_eq!(config.sync_timeout, Duration::from_secs(5));
        assert!(config.restart_schedule_on_relapse);
    }

    #[test]
    fn offsets_parse_from_csv() {
        assert_eq!(parse_offsets("1, 5,15"), Some(vec![1, 5, 15]));
        assert_eq!(parse_offsets(""), None);
    }
}
