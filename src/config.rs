// src/config.rs
//! Application configuration: TOML file with built-in defaults.
//!
//! Load order:
//! 1) `$TRENDCAST_CONFIG_PATH`
//! 2) `config/trendcast.toml`
//! 3) built-in defaults

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fingerprint::NormalizerConfig;
use crate::policy::PolicyConfig;
use crate::queue::QueueConfig;
use crate::score::ScoreConfig;

pub const ENV_CONFIG_PATH: &str = "TRENDCAST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/trendcast.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between fetch/aggregate cycles.
    pub tick_secs: u64,
    /// Per-source fetch timeout, seconds.
    pub fetch_timeout_secs: u64,
    /// Content-generation timeout, seconds.
    pub generate_timeout_secs: u64,
    /// Publish timeout, seconds.
    pub publish_timeout_secs: u64,
    /// Items requested from each source per cycle.
    pub fetch_limit: usize,
    /// Top-ranked candidates enqueued per cycle.
    pub enqueue_top: usize,
    /// Canonical items unseen for this long fall out of the active window.
    pub item_max_age_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 15 * 60,
            fetch_timeout_secs: 20,
            generate_timeout_secs: 30,
            publish_timeout_secs: 30,
            fetch_limit: 10,
            enqueue_top: 5,
            item_max_age_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub policy: PolicyConfig,
    pub queue: QueueConfig,
    pub score: ScoreConfig,
    pub fingerprint: NormalizerConfig,
    /// Path of the persisted state snapshot.
    pub state_path: String,
    /// Dashboard bind address.
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            policy: PolicyConfig::default(),
            queue: QueueConfig::default(),
            score: ScoreConfig::default(),
            fingerprint: NormalizerConfig::default(),
            state_path: "state/trendcast.json".into(),
            bind_addr: "127.0.0.1:8080".into(),
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    /// Reject values that would wedge the control loop at runtime instead of
    /// failing at startup.
    pub fn validate(&self) -> Result<()> {
        if self.policy.quiet_start_hour > 23 || self.policy.quiet_end_hour > 23 {
            return Err(anyhow!(
                "policy quiet hours must be in 0..=23, got {} -> {}",
                self.policy.quiet_start_hour,
                self.policy.quiet_end_hour
            ));
        }
        if self.policy.window_secs <= 0 {
            return Err(anyhow!(
                "policy window_secs must be positive, got {}",
                self.policy.window_secs
            ));
        }
        Ok(())
    }

    /// Env path override, then the default file, then built-in defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to a non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.policy.quiet_start_hour, 23);
        assert_eq!(cfg.policy.quiet_end_hour, 7);
        assert_eq!(cfg.policy.max_posts_per_window, 4);
        assert_eq!(cfg.queue.retry_ceiling, 3);
    }

    #[test]
    fn out_of_range_quiet_hour_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.policy.quiet_end_hour = 24;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("0..=23"));

        cfg.policy.quiet_end_hour = 7;
        cfg.policy.quiet_start_hour = 99;
        assert!(cfg.validate().is_err());

        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn non_positive_rate_window_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.policy.window_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            state_path = "/tmp/x.json"

            [policy]
            max_posts_per_window = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.state_path, "/tmp/x.json");
        assert_eq!(cfg.policy.max_posts_per_window, 2);
        assert_eq!(cfg.policy.quiet_start_hour, 23);
        assert_eq!(cfg.scheduler.fetch_limit, 10);
    }
}
