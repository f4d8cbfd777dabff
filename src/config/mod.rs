//! Configuration loading for the show catalog ingestion service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SHOWSYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::upstream::UpdatePeriod;
use crate::workflow::RetryPolicy;

const ENV_PREFIX: &str = "SHOWSYNC_";

/// Application configuration derived from `SHOWSYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub update_timer: UpdateTimerConfig,
}

/// Upstream catalog API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UpstreamConfig {
    /// Base URL of the catalog API (default: https://api.tvmaze.com)
    ///
    /// Environment variable: `SHOWSYNC_UPSTREAM_BASE_URL`
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds
    ///
    /// Environment variable: `SHOWSYNC_UPSTREAM_TIMEOUT_MS`
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// User agent sent with every request
    ///
    /// Environment variable: `SHOWSYNC_UPSTREAM_USER_AGENT`
    #[serde(default = "default_upstream_user_agent")]
    pub user_agent: String,
}

/// Workflow engine and activity execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WorkflowConfig {
    /// Maximum in-flight show activities per fan-out batch (K)
    ///
    /// Environment variable: `SHOWSYNC_WORKFLOW_CONCURRENCY_LIMIT`
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Pause between full-sync batches in milliseconds; 0 disables the timer
    ///
    /// Environment variable: `SHOWSYNC_WORKFLOW_BATCH_DELAY_MS`
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Activity slots shared by every run in the process
    ///
    /// Environment variable: `SHOWSYNC_WORKFLOW_WORKER_POOL_SIZE`
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Attempts per activity before a transient failure becomes final
    ///
    /// Environment variable: `SHOWSYNC_RETRY_MAX_ATTEMPTS`
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Linear backoff base; attempt n waits n * base
    ///
    /// Environment variable: `SHOWSYNC_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Daily delta-sync trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UpdateTimerConfig {
    #[serde(default = "default_update_timer_enabled")]
    pub enabled: bool,
    /// Hour of day (UTC) at which the delta sync starts
    #[serde(default = "default_update_timer_hour_utc")]
    pub hour_utc: u32,
    /// Change-feed window requested from upstream
    #[serde(default)]
    pub period: UpdatePeriod,
    /// Random delay added to each fire time, in seconds
    #[serde(default)]
    pub jitter_max_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            upstream: UpstreamConfig::default(),
            workflow: WorkflowConfig::default(),
            update_timer: UpdateTimerConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            timeout_ms: default_upstream_timeout_ms(),
            user_agent: default_upstream_user_agent(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            batch_delay_ms: default_batch_delay_ms(),
            worker_pool_size: default_worker_pool_size(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for UpdateTimerConfig {
    fn default() -> Self {
        Self {
            enabled: default_update_timer_enabled(),
            hour_utc: default_update_timer_hour_utc(),
            period: UpdatePeriod::default(),
            jitter_max_seconds: 0,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if let Ok(mut url) = Url::parse(&config.database_url)
            && url.password().is_some()
            && url.set_password(Some("[REDACTED]")).is_ok()
        {
            config.database_url = url.to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Admin endpoints are unreachable without a token outside local/test
        if !matches!(self.profile.as_str(), "local" | "test") && self.operator_tokens.is_empty() {
            return Err(ConfigError::MissingOperatorTokens);
        }

        self.upstream.validate()?;
        self.workflow.validate()?;
        self.update_timer.validate()?;

        Ok(())
    }
}

impl UpstreamConfig {
    /// Parsed base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidUpstreamBaseUrl {
            value: self.base_url.clone(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidUpstreamTimeout {
                value: self.timeout_ms,
            });
        }
        Ok(())
    }
}

impl WorkflowConfig {
    /// Retry policy applied to every activity attempt.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 || self.concurrency_limit > 100 {
            return Err(ConfigError::InvalidConcurrencyLimit {
                value: self.concurrency_limit,
            });
        }
        if self.worker_pool_size < self.concurrency_limit {
            return Err(ConfigError::InvalidWorkerPoolSize {
                value: self.worker_pool_size,
                concurrency_limit: self.concurrency_limit,
            });
        }
        if self.retry_max_attempts == 0 || self.retry_max_attempts > 10 {
            return Err(ConfigError::InvalidRetryAttempts {
                value: self.retry_max_attempts,
            });
        }
        Ok(())
    }
}

impl UpdateTimerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hour_utc > 23 {
            return Err(ConfigError::InvalidTimerHour {
                value: self.hour_utc,
            });
        }
        if self.jitter_max_seconds > 3600 {
            return Err(ConfigError::InvalidTimerJitter {
                value: self.jitter_max_seconds,
            });
        }
        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/showsync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_upstream_base_url() -> String {
    "https://api.tvmaze.com".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    10_000 // 10 seconds
}

fn default_upstream_user_agent() -> String {
    concat!("showsync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_concurrency_limit() -> usize {
    10 // keeps full sync under the upstream rate limit
}

fn default_batch_delay_ms() -> u64 {
    1000 // 1 second between batches
}

fn default_worker_pool_size() -> usize {
    32
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000 // 2s, 4s between attempts
}

fn default_update_timer_enabled() -> bool {
    true
}

fn default_update_timer_hour_utc() -> u32 {
    5 // 05:00 UTC daily
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("no operator tokens configured; set SHOWSYNC_OPERATOR_TOKEN or SHOWSYNC_OPERATOR_TOKENS")]
    MissingOperatorTokens,
    #[error("invalid upstream base url '{value}': {source}")]
    InvalidUpstreamBaseUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("upstream timeout must be positive, got {value}")]
    InvalidUpstreamTimeout { value: u64 },
    #[error("workflow concurrency limit must be between 1 and 100, got {value}")]
    InvalidConcurrencyLimit { value: usize },
    #[error(
        "workflow worker pool size ({value}) must be at least the concurrency limit ({concurrency_limit})"
    )]
    InvalidWorkerPoolSize {
        value: usize,
        concurrency_limit: usize,
    },
    #[error("retry max attempts must be between 1 and 10, got {value}")]
    InvalidRetryAttempts { value: u32 },
    #[error("update timer hour must be between 0 and 23, got {value}")]
    InvalidTimerHour { value: u32 },
    #[error("update timer jitter must not exceed 3600 seconds, got {value}")]
    InvalidTimerJitter { value: u64 },
    #[error("invalid update period '{value}'; expected day, week or month")]
    InvalidUpdatePeriod { value: String },
}

/// Loads configuration using layered `.env` files and `SHOWSYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader that reads `.env` files from `base_dir`.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local`,
    /// then the process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        // Support both a single token and a comma-separated list
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = layered.remove("OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let upstream = UpstreamConfig {
            base_url: layered
                .remove("UPSTREAM_BASE_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_upstream_base_url),
            timeout_ms: layered
                .remove("UPSTREAM_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_upstream_timeout_ms),
            user_agent: layered
                .remove("UPSTREAM_USER_AGENT")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_upstream_user_agent),
        };

        let workflow = WorkflowConfig {
            concurrency_limit: layered
                .remove("WORKFLOW_CONCURRENCY_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_concurrency_limit),
            batch_delay_ms: layered
                .remove("WORKFLOW_BATCH_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_batch_delay_ms),
            worker_pool_size: layered
                .remove("WORKFLOW_WORKER_POOL_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_pool_size),
            retry_max_attempts: layered
                .remove("RETRY_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_max_attempts),
            retry_base_delay_ms: layered
                .remove("RETRY_BASE_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_base_delay_ms),
        };

        let period = match layered.remove("UPDATE_TIMER_PERIOD").filter(|v| !v.is_empty()) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidUpdatePeriod { value })?,
            None => UpdatePeriod::default(),
        };
        let update_timer = UpdateTimerConfig {
            enabled: layered
                .remove("UPDATE_TIMER_ENABLED")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_update_timer_enabled),
            hour_utc: layered
                .remove("UPDATE_TIMER_HOUR_UTC")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_update_timer_hour_utc),
            period,
            jitter_max_seconds: layered
                .remove("UPDATE_TIMER_JITTER_MAX_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            operator_tokens,
            upstream,
            workflow,
            update_timer,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("SHOWSYNC_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
