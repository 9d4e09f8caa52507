//! Worker configuration: TOML file plus `BRAINFLOW_*` environment overrides.
//!
//! ```toml
//! poll_interval_ms = 250
//!
//! [retry]
//! max_attempts = 3
//! base_backoff_secs = 120
//! strategy = "linear"
//!
//! [lease]
//! ttl_secs = 300
//!
//! [[lanes]]
//! lane = "ai-processing-high"
//! concurrency = 8
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::jobs::{BackoffStrategy, LaneConfig, QueueRouter, RetryPolicy};
use crate::lease::DEFAULT_LEASE_TTL;
use crate::scheduler::DEFAULT_STALL_TIMEOUT;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_AI_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    #[serde(default)]
    pub lanes: Vec<LaneConfig>,
    pub retry: Option<RetryConfig>,
    pub lease: Option<LeaseConfig>,
    pub poll_interval_ms: Option<u64>,
    pub stall_timeout_secs: Option<u64>,
    pub ai_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub strategy: Option<BackoffStrategy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseConfig {
    pub ttl_secs: Option<u64>,
}

impl WorkerConfig {
    /// Read `path`. A named file that cannot be read is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `load`, then process-environment overrides. No path means defaults.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `BRAINFLOW_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            })
        }

        if let Some(v) = lookup("BRAINFLOW_MAX_ATTEMPTS") {
            self.retry.get_or_insert_with(Default::default).max_attempts =
                Some(parse("BRAINFLOW_MAX_ATTEMPTS", v)?);
        }
        if let Some(v) = lookup("BRAINFLOW_BASE_BACKOFF_SECS") {
            self.retry.get_or_insert_with(Default::default).base_backoff_secs =
                Some(parse("BRAINFLOW_BASE_BACKOFF_SECS", v)?);
        }
        if let Some(v) = lookup("BRAINFLOW_LEASE_TTL_SECS") {
            self.lease.get_or_insert_with(Default::default).ttl_secs =
                Some(parse("BRAINFLOW_LEASE_TTL_SECS", v)?);
        }
        if let Some(v) = lookup("BRAINFLOW_POLL_INTERVAL_MS") {
            self.poll_interval_ms = Some(parse("BRAINFLOW_POLL_INTERVAL_MS", v)?);
        }
        if let Some(v) = lookup("BRAINFLOW_STALL_TIMEOUT_SECS") {
            self.stall_timeout_secs = Some(parse("BRAINFLOW_STALL_TIMEOUT_SECS", v)?);
        }
        if let Some(v) = lookup("BRAINFLOW_AI_TIMEOUT_SECS") {
            self.ai_timeout_secs = Some(parse("BRAINFLOW_AI_TIMEOUT_SECS", v)?);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(lane) = self.lanes.iter().find(|l| l.concurrency == 0) {
            return Err(ConfigError::Invalid(format!(
                "lane {} needs at least one worker",
                lane.lane
            )));
        }
        if self.retry_policy().max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".to_string()));
        }
        if self.lease_ttl().is_zero() {
            return Err(ConfigError::Invalid("lease.ttl_secs must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let Some(retry) = &self.retry else {
            return defaults;
        };

        RetryPolicy {
            max_attempts: retry.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: retry
                .base_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.base_delay),
            max_delay: retry
                .max_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_delay),
            strategy: retry.strategy.unwrap_or(defaults.strategy),
        }
    }

    pub fn router(&self) -> QueueRouter {
        QueueRouter::new(self.lanes.iter().copied())
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease
            .as_ref()
            .and_then(|l| l.ttl_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LEASE_TTL)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STALL_TIMEOUT)
    }

    pub fn ai_timeout(&self) -> Duration {
        self.ai_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_AI_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::jobs::Lane;

    use super::*;

    #[test]
    fn defaults_match_workflow_policy() {
        let config = WorkerConfig::default();
        let policy = config.retry_policy();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(240));
        assert_eq!(config.lease_ttl(), Duration::from_secs(300));
        assert!(config.stall_timeout() > config.lease_ttl());
    }

    #[test]
    fn parses_toml_sections() {
        let config: WorkerConfig = toml::from_str(
            r#"
            poll_interval_ms = 50

            [retry]
            max_attempts = 5
            strategy = "fixed"

            [[lanes]]
            lane = "ai-processing-high"
            concurrency = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().strategy, BackoffStrategy::Fixed);
        assert_eq!(config.router().config(Lane::AiProcessingHigh).concurrency, 8);
        assert_eq!(config.router().config(Lane::AiLearning).concurrency, 1);
    }

    #[test]
    fn unknown_lane_names_are_rejected() {
        let parsed: Result<WorkerConfig, _> = toml::from_str(
            r#"
            [[lanes]]
            lane = "ai-everything"
            concurrency = 1
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("BRAINFLOW_MAX_ATTEMPTS", "4"),
            ("BRAINFLOW_LEASE_TTL_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let config = WorkerConfig::default()
            .with_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.retry_policy().max_attempts, 4);
        assert_eq!(config.lease_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn bad_env_values_are_reported() {
        let err = WorkerConfig::default()
            .with_env_overrides(|key| (key == "BRAINFLOW_POLL_INTERVAL_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let config = WorkerConfig {
            lanes: vec![LaneConfig {
                lane: Lane::AiEmbeddings,
                concurrency: 0,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn named_missing_file_is_an_error() {
        let err = WorkerConfig::load(Path::new("/nonexistent/brainflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { ref path, .. } if path == Path::new("/nonexistent/brainflow.toml")));

        let err = WorkerConfig::load_with_env(Some(Path::new("/nonexistent/brainflow.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn no_file_means_defaults() {
        let config = WorkerConfig::default().with_env_overrides(|_| None).unwrap();
        assert!(config.lanes.is_empty());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }
}
