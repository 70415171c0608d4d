//! Tunables for the ingestion services.

use std::str::FromStr;
use std::time::Duration;

use roadscan_core::ffmpeg::DEFAULT_THUMBNAIL_OFFSET_SECS;

/// Default reconciliation period.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default upper bound on a single remote status fetch.
pub const DEFAULT_POLL_FETCH_TIMEOUT_SECS: u64 = 10;

/// Default delay between demo progress steps.
pub const DEFAULT_DEMO_STEP_DELAY_MS: u64 = 600;

/// Progress values a demo video walks through before completing.
pub const DEMO_PROGRESS_STEPS: &[u8] = &[10, 25, 40, 60, 80, 95];

/// Default range for the placeholder duration of library imports.
pub const DEFAULT_LIBRARY_DURATION_MIN_SECS: f64 = 60.0;
pub const DEFAULT_LIBRARY_DURATION_MAX_SECS: f64 = 600.0;

/// Ingestion configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Reconciliation poller period.
    pub poll_interval: Duration,
    /// Bound on each `get_video` call made by the poller.
    pub poll_fetch_timeout: Duration,
    /// Upper bound on the thumbnail seek position, in seconds.
    pub thumbnail_offset_secs: f64,
    pub demo_step_delay: Duration,
    pub demo_progress_steps: Vec<u8>,
    /// Placeholder duration range for library imports, in seconds.
    pub library_duration_min_secs: f64,
    pub library_duration_max_secs: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_fetch_timeout: Duration::from_secs(DEFAULT_POLL_FETCH_TIMEOUT_SECS),
            thumbnail_offset_secs: DEFAULT_THUMBNAIL_OFFSET_SECS,
            demo_step_delay: Duration::from_millis(DEFAULT_DEMO_STEP_DELAY_MS),
            demo_progress_steps: DEMO_PROGRESS_STEPS.to_vec(),
            library_duration_min_secs: DEFAULT_LIBRARY_DURATION_MIN_SECS,
            library_duration_max_secs: DEFAULT_LIBRARY_DURATION_MAX_SECS,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `POLL_INTERVAL_MS`          | `2000`  |
    /// | `POLL_FETCH_TIMEOUT_SECS`   | `10`    |
    /// | `THUMBNAIL_OFFSET_SECS`     | `5`     |
    /// | `DEMO_STEP_DELAY_MS`        | `600`   |
    /// | `LIBRARY_DURATION_MIN_SECS` | `60`    |
    /// | `LIBRARY_DURATION_MAX_SECS` | `600`   |
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let poll_interval_ms = parse_or(&lookup, "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let poll_fetch_timeout_secs = parse_or(
            &lookup,
            "POLL_FETCH_TIMEOUT_SECS",
            DEFAULT_POLL_FETCH_TIMEOUT_SECS,
        );
        let thumbnail_offset_secs = parse_or(
            &lookup,
            "THUMBNAIL_OFFSET_SECS",
            DEFAULT_THUMBNAIL_OFFSET_SECS,
        );
        let demo_step_delay_ms =
            parse_or(&lookup, "DEMO_STEP_DELAY_MS", DEFAULT_DEMO_STEP_DELAY_MS);
        let mut library_duration_min_secs = parse_or(
            &lookup,
            "LIBRARY_DURATION_MIN_SECS",
            DEFAULT_LIBRARY_DURATION_MIN_SECS,
        );
        let mut library_duration_max_secs = parse_or(
            &lookup,
            "LIBRARY_DURATION_MAX_SECS",
            DEFAULT_LIBRARY_DURATION_MAX_SECS,
        );
        if library_duration_max_secs < library_duration_min_secs {
            tracing::warn!(
                min = library_duration_min_secs,
                max = library_duration_max_secs,
                "Library duration range is inverted, using defaults",
            );
            library_duration_min_secs = DEFAULT_LIBRARY_DURATION_MIN_SECS;
            library_duration_max_secs = DEFAULT_LIBRARY_DURATION_MAX_SECS;
        }

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            poll_fetch_timeout: Duration::from_secs(poll_fetch_timeout_secs),
            thumbnail_offset_secs,
            demo_step_delay: Duration::from_millis(demo_step_delay_ms),
            demo_progress_steps: DEMO_PROGRESS_STEPS.to_vec(),
            library_duration_min_secs,
            library_duration_max_secs,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Invalid value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = IngestConfig::from_lookup(lookup(&[]));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.poll_fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.thumbnail_offset_secs, 5.0);
        assert_eq!(config.demo_step_delay, Duration::from_millis(600));
        assert_eq!(config.demo_progress_steps, vec![10, 25, 40, 60, 80, 95]);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = IngestConfig::from_lookup(lookup(&[
            ("POLL_INTERVAL_MS", "250"),
            ("THUMBNAIL_OFFSET_SECS", "2.5"),
            ("DEMO_STEP_DELAY_MS", "0"),
        ]));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.thumbnail_offset_secs, 2.5);
        assert_eq!(config.demo_step_delay, Duration::ZERO);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = IngestConfig::from_lookup(lookup(&[
            ("POLL_INTERVAL_MS", "soon"),
            ("LIBRARY_DURATION_MIN_SECS", "900"),
            ("LIBRARY_DURATION_MAX_SECS", "100"),
        ]));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.library_duration_min_secs, 60.0);
        assert_eq!(config.library_duration_max_secs, 600.0);
    }
}
