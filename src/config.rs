use chrono::Duration;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::repository::RepositorySettings;
use crate::app::scheduler::RefreshPolicy;
use crate::app::staleness::StalenessPolicy;
use crate::constants::{
    DEFAULT_BACKOFF_SECS, DEFAULT_BASE_URL, DEFAULT_MIN_REARM_SECS, DEFAULT_STALE_AFTER_SECS, DEFAULT_TIMEOUT_SECS,
    DEFAULT_USER_AGENT,
};
use crate::error::{Result, TleError};

pub const DEFAULT_CONFIG_PATH: &str = "tle-cache.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("cache/tle") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub stale_after_secs: i64,
    pub min_rearm_secs: i64,
    pub backoff_secs: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            min_rearm_secs: DEFAULT_MIN_REARM_SECS,
            backoff_secs: DEFAULT_BACKOFF_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("logs") }
    }
}

impl Config {
    /// Load from `path` (or the default file), then apply environment overrides.
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Config::default(),
            Err(e) => {
                return Err(TleError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                )))
            }
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Override fields from environment-style variables supplied by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TLE_CACHE_BASE_URL") {
            self.source.base_url = v;
        }
        if let Some(v) = lookup("TLE_CACHE_USER_AGENT") {
            self.source.user_agent = v;
        }
        if let Some(v) = lookup("TLE_CACHE_TIMEOUT_SECS") {
            self.source.timeout_secs = parse_number("TLE_CACHE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("TLE_CACHE_DIR") {
            self.cache.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TLE_CACHE_STALE_AFTER_SECS") {
            self.policy.stale_after_secs = parse_number("TLE_CACHE_STALE_AFTER_SECS", &v)?;
        }
        if let Some(v) = lookup("TLE_CACHE_LOG_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.timeout_secs == 0 {
            return Err(TleError::Config("source.timeout_secs must be greater than zero".into()));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(TleError::Config("source.user_agent must not be empty".into()));
        }
        let policy = &self.policy;
        if policy.stale_after_secs < 0 || policy.min_rearm_secs < 0 || policy.backoff_secs < 0 {
            return Err(TleError::Config("policy durations must not be negative".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.source.timeout_secs)
    }

    pub fn repository_settings(&self) -> RepositorySettings {
        RepositorySettings {
            staleness: StalenessPolicy::new(Duration::seconds(self.policy.stale_after_secs)),
            backoff_window: Duration::seconds(self.policy.backoff_secs),
            // Outer bound above the transport timeout; the HTTP error wins when both fire
            fetch_timeout: self.timeout() * 2,
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::new(
            Duration::seconds(self.policy.stale_after_secs),
            Duration::seconds(self.policy.min_rearm_secs),
        )
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TleError::Config(format!("{} must be a number, got {:?}", name, value)))
}
