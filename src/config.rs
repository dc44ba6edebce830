//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
///
/// Built from environment variables with sensible defaults; every knob can
/// also be set directly (tests do).
#[derive(Debug, Clone)]
pub struct PostbeamConfig {
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// How often the dispatch loop wakes to look for due items.
    pub poll_interval: Duration,
    /// Per-item delivery timeout within a dispatch round.
    pub delivery_timeout: Duration,
    /// Maximum deliveries in flight at once during a dispatch round.
    pub max_concurrent_deliveries: usize,
    /// Default number of entries returned when listing the event log.
    pub event_log_limit: usize,
}

impl Default for PostbeamConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/postbeam.db"),
            poll_interval: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(30),
            max_concurrent_deliveries: 4,
            event_log_limit: 30,
        }
    }
}

impl PostbeamConfig {
    /// Build a config from `POSTBEAM_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let db_path = std::env::var("POSTBEAM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let poll_interval = env_u64("POSTBEAM_POLL_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let delivery_timeout = env_u64("POSTBEAM_DELIVERY_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.delivery_timeout);

        let max_concurrent_deliveries = env_u64("POSTBEAM_MAX_CONCURRENT_DELIVERIES")
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_concurrent_deliveries);

        let event_log_limit = env_u64("POSTBEAM_EVENT_LOG_LIMIT")
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(defaults.event_log_limit);

        Self {
            db_path,
            poll_interval,
            delivery_timeout,
            max_concurrent_deliveries,
            event_log_limit,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PostbeamConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.delivery_timeout, Duration::from_secs(30));
        assert!(cfg.max_concurrent_deliveries > 0);
        assert!(cfg.event_log_limit > 0);
    }
}
