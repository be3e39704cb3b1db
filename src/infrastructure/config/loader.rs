use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::{Config, RateLimitPolicy};
use crate::infrastructure::logging::{LogFormat, RotationPolicy};

pub const PROJECT_CONFIG: &str = ".autoapply/config.yaml";
pub const LOCAL_CONFIG: &str = ".autoapply/local.yaml";
pub const ENV_PREFIX: &str = "AUTOAPPLY_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid workers: {0}. Must be between 1 and 256")]
    InvalidWorkers(usize),

    #[error(
        "Invalid backoff configuration: base_delay_ms ({0}) must be positive and not exceed max_delay_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid jitter_ratio: {0}. Must be between 0.0 and 1.0")]
    InvalidJitter(f64),

    #[error("Invalid rate limit policy for {host}: requests_per_minute and max_concurrent must be at least 1")]
    InvalidRateLimit { host: String },

    #[error("Invalid escalation thresholds: degrade ({0}) must be at least 1 and below block ({1})")]
    InvalidThresholds(u32, u32),

    #[error("Invalid degraded_rate_factor: {0}. Must be in (0.0, 1.0]")]
    InvalidRateFactor(f64),

    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .autoapply/config.yaml (project config, created by init)
    /// 3. .autoapply/local.yaml (local overrides, optional)
    /// 4. Environment variables (AUTOAPPLY_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(&[Path::new(PROJECT_CONFIG), Path::new(LOCAL_CONFIG)])
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment variables still
    /// take precedence.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Self::figment(&[path])
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(files: &[&Path]) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        for file in files {
            figment = figment.merge(Yaml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if LogFormat::from_str(&config.logging.format).is_none() {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        if RotationPolicy::from_str(&config.logging.rotation).is_none() {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.scheduler.workers == 0 || config.scheduler.workers > 256 {
            return Err(ConfigError::InvalidWorkers(config.scheduler.workers));
        }
        if config.scheduler.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "scheduler.poll_interval_ms must be positive".to_string(),
            ));
        }
        // A live worker may hold a claim for the whole admission wait.
        if config.scheduler.claim_lease_ms <= config.admission.acquire_timeout_ms {
            return Err(ConfigError::ValidationFailed(format!(
                "scheduler.claim_lease_ms ({}) must exceed admission.acquire_timeout_ms ({})",
                config.scheduler.claim_lease_ms, config.admission.acquire_timeout_ms
            )));
        }

        let retry = &config.retry;
        if retry.base_delay_ms == 0 || retry.base_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(retry.base_delay_ms, retry.max_delay_ms));
        }
        if !(0.0..=1.0).contains(&retry.jitter_ratio) {
            return Err(ConfigError::InvalidJitter(retry.jitter_ratio));
        }

        let admission = &config.admission;
        validate_policy("default", &admission.default_policy)?;
        for domain in &admission.domains {
            if domain.host.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "admission domain host cannot be empty".to_string(),
                ));
            }
            validate_policy(
                &domain.host,
                &RateLimitPolicy {
                    requests_per_minute: domain.requests_per_minute,
                    max_concurrent: domain.max_concurrent,
                },
            )?;
        }
        if admission.degrade_threshold == 0 || admission.degrade_threshold >= admission.block_threshold {
            return Err(ConfigError::InvalidThresholds(
                admission.degrade_threshold,
                admission.block_threshold,
            ));
        }
        if !(admission.degraded_rate_factor > 0.0 && admission.degraded_rate_factor <= 1.0) {
            return Err(ConfigError::InvalidRateFactor(admission.degraded_rate_factor));
        }

        validate_url("browser.webdriver_url", &config.browser.webdriver_url)?;
        if config.browser.submit_timeout_ms == 0 || config.browser.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "browser timeouts must be positive".to_string(),
            ));
        }

        if let Some(url) = &config.notifications.webhook_url {
            validate_url("notifications.webhook_url", url)?;
        }

        Ok(())
    }
}

fn validate_policy(host: &str, policy: &RateLimitPolicy) -> Result<(), ConfigError> {
    if policy.requests_per_minute == 0 || policy.max_concurrent == 0 {
        return Err(ConfigError::InvalidRateLimit {
            host: host.to_string(),
        });
    }
    Ok(())
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}
