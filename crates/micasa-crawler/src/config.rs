use std::cmp;
use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_throttle")]
    pub throttle: Option<Throttle>,

    #[serde(default = "default_on_fetch_error")]
    pub on_fetch_error: OnError,

    #[serde(default = "default_on_parse_error")]
    pub on_parse_error: OnError,

    #[serde(default = "default_on_sink_error")]
    pub on_sink_error: OnError,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            num_workers: default_num_workers(),
            idle_backoff_ms: default_idle_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            throttle: default_throttle(),
            on_fetch_error: default_on_fetch_error(),
            on_parse_error: default_on_parse_error(),
            on_sink_error: default_on_sink_error(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

impl CrawlerConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Rejects settings the coordinator cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_workers == 0 {
            bail!("Invalid crawler config, `numWorkers` must be at least 1");
        }
        if self.idle_backoff_ms == 0 {
            bail!("Invalid crawler config, `idleBackoffMs` must be at least 1");
        }
        if let Some(Throttle::Delay(secs)) = self.throttle {
            if !secs.is_finite() || secs < 0.0 {
                bail!("Invalid crawler config, throttle delay {secs} is not a positive duration");
            }
        }
        Ok(())
    }
}

fn default_user_agent() -> String {
    String::from("micasa")
}

fn default_num_workers() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_idle_backoff_ms() -> u64 {
    400
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_throttle() -> Option<Throttle> {
    None
}

fn default_on_fetch_error() -> OnError {
    OnError::SkipAndLog
}

fn default_on_parse_error() -> OnError {
    OnError::SkipAndLog
}

fn default_on_sink_error() -> OnError {
    OnError::SkipAndLog
}

fn default_handle_sigint() -> bool {
    true
}

/// What a failed task means for the whole run.
///
/// Failed tasks are never retried and never stop the workers, `Fail` only
/// turns the run result into an error once the queue has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Throttle {
    /// The maximum number of concurrent requests
    Concurrent(NonZeroUsize),
    /// The number of requests per second
    PerSecond(NonZeroUsize),
    /// The delay in seconds between requests
    Delay(f32),
}

impl Default for Throttle {
    fn default() -> Self {
        Self::Concurrent(NonZeroUsize::MIN.saturating_add(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_uses_defaults() {
        let conf: CrawlerConfig = serde_yaml::from_str("numWorkers: 3\nonFetchError: Fail\n").unwrap();
        assert_eq!(conf.num_workers, 3);
        assert_eq!(conf.on_fetch_error, OnError::Fail);
        assert_eq!(conf.on_parse_error, OnError::SkipAndLog);
        assert_eq!(conf.idle_backoff(), Duration::from_millis(400));
        assert_eq!(conf.user_agent, "micasa");
        assert!(conf.throttle.is_none());
        assert!(conf.handle_sigint);
    }

    #[test]
    fn throttle_from_yaml() {
        let conf: CrawlerConfig = serde_yaml::from_str("throttle: !PerSecond 5\n").unwrap();
        assert_eq!(conf.throttle, Some(Throttle::PerSecond(NonZeroUsize::new(5).unwrap())));
    }

    #[test]
    fn validate_rejects_empty_pool() {
        let conf = CrawlerConfig {
            num_workers: 0,
            ..Default::default()
        };
        assert!(conf.validate().is_err());
        assert!(CrawlerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_delay() {
        let conf = CrawlerConfig {
            throttle: Some(Throttle::Delay(-1.0)),
            ..Default::default()
        };
        assert!(conf.validate().is_err());
    }
}
