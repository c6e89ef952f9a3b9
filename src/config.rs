use std::time::Duration;

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Root of the REST backend; posts live under `{api_url}/posts`.
    pub api_url: String,
    /// Per-request timeout. Requests never time out when unset.
    pub request_timeout_secs: Option<u64>,
    /// `chrono` format string for post timestamps.
    pub time_format: String,

    pub sync: SyncConfig,
}

/// How optimistic mutations are propagated and ordered.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// Total attempts per remote mutation; 1 sends once and never retries.
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub order: OrderPolicy,
    pub on_failure: FailurePolicy,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderPolicy {
    /// Prepend created posts and edit in place; order only at fetch.
    #[default]
    Splice,
    /// Keep newest first after every mutation.
    Resort,
}

/// What happens to a local change once its last attempt has failed.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log it and keep the local change.
    #[default]
    Keep,
    /// Log it and undo the local change.
    RollBack,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:4000".to_owned(),
            request_timeout_secs: None,
            time_format: "%Y-%m-%d %H:%M".to_owned(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_delay_ms: 500,
            order: OrderPolicy::default(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl SyncConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "api_url: http://feed.local:8080\nsync:\n  order: resort\n",
        )
        .unwrap();

        assert_eq!(cfg.api_url, "http://feed.local:8080");
        assert_eq!(cfg.request_timeout(), None);
        assert_eq!(cfg.sync.order, OrderPolicy::Resort);
        assert_eq!(cfg.sync.max_attempts, 1);
        assert_eq!(cfg.sync.on_failure, FailurePolicy::Keep);
        assert_eq!(cfg.sync.retry_delay(), Duration::from_millis(500));
    }

    #[test]
    fn defaults_splice_and_keep_failed_changes() {
        let sync = SyncConfig::default();
        assert_eq!(sync.order, OrderPolicy::Splice);
        assert_eq!(sync.max_attempts, 1);
        assert_eq!(sync.on_failure, FailurePolicy::Keep);

        let sync: SyncConfig =
            serde_yaml::from_str("max_attempts: 3\non_failure: roll_back\n").unwrap();
        assert_eq!(sync.on_failure, FailurePolicy::RollBack);
        assert_eq!(sync.order, OrderPolicy::Splice);
    }
}
