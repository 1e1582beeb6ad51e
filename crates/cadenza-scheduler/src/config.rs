//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA name of the default zone for newly computed due times.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Scheduler-wide cap on a single execution, in milliseconds.
    /// 0 leaves executions unbounded; per-job exemption is the
    /// `LONG_RUNNING` option.
    #[serde(default)]
    pub max_execution_ms: u64,

    /// Waits at or below this floor are served by spinning instead of the
    /// OS timer, which cannot hit sub-millisecond deadlines.
    #[serde(default = "default_min_timer_wait_ms")]
    pub min_timer_wait_ms: u64,

    /// Longest single timer arm; longer waits re-arm after this ceiling.
    /// The default tracks the OS timer limit of roughly 49 days.
    #[serde(default = "default_max_timer_wait_ms")]
    pub max_timer_wait_ms: u64,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_min_timer_wait_ms() -> u64 {
    1
}

fn default_max_timer_wait_ms() -> u64 {
    // 49 days.
    49 * 24 * 60 * 60 * 1_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_zone: default_time_zone(),
            max_execution_ms: 0,
            min_timer_wait_ms: default_min_timer_wait_ms(),
            max_timer_wait_ms: default_max_timer_wait_ms(),
        }
    }
}

impl SchedulerConfig {
    /// The execution cap as a duration, `None` when unbounded.
    pub fn max_execution(&self) -> Option<Duration> {
        (self.max_execution_ms > 0).then(|| Duration::from_millis(self.max_execution_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.time_zone, "UTC");
        assert_eq!(config.max_execution_ms, 0);
        assert_eq!(config.max_execution(), None);
        assert_eq!(config.min_timer_wait_ms, 1);
        assert_eq!(config.max_timer_wait_ms, 4_233_600_000);
    }

    #[test]
    fn test_max_execution_conversion() {
        let config = SchedulerConfig {
            max_execution_ms: 50,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.max_execution(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_config_serialization() {
        let config = SchedulerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.time_zone, config.time_zone);
        assert_eq!(parsed.max_timer_wait_ms, config.max_timer_wait_ms);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.time_zone, "UTC");
        assert_eq!(parsed.min_timer_wait_ms, 1);
    }
}
