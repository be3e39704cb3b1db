use serde::{Deserialize, Serialize};

use super::domain_policy::RateLimitPolicy;

/// Main configuration structure for autoapply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-host admission control
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Browser automation backend
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Diagnostic artifact storage
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Completion event delivery
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".autoapply/autoapply.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Number of concurrent task runs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delay between polls when the queue is empty
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Worker identity prefix recorded in `assigned_worker`
    #[serde(default)]
    pub worker_id: Option<String>,

    /// Age after which a claim on a still-queued task is considered abandoned
    #[serde(default = "default_claim_lease_ms")]
    pub claim_lease_ms: u64,
}

const fn default_workers() -> usize {
    4
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_claim_lease_ms() -> u64 {
    600_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            worker_id: None,
            claim_lease_ms: default_claim_lease_ms(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Relative jitter applied to each delay (0.0 - 1.0)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_base_delay_ms() -> u64 {
    30_000
}

const fn default_max_delay_ms() -> u64 {
    1_800_000
}

const fn default_jitter_ratio() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

/// What `acquire` does when a host has no capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Queue FIFO behind earlier waiters, up to the acquire timeout
    Wait,
    /// Fail immediately
    Reject,
}

impl Default for AdmissionMode {
    fn default() -> Self {
        Self::Wait
    }
}

/// Per-host policy override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DomainPolicyConfig {
    pub host: String,
    pub requests_per_minute: u32,
    pub max_concurrent: u32,
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdmissionConfig {
    /// Policy for hosts without an override
    #[serde(default)]
    pub default_policy: RateLimitPolicy,

    /// Hosts provisioned ahead of time
    #[serde(default)]
    pub domains: Vec<DomainPolicyConfig>,

    #[serde(default)]
    pub mode: AdmissionMode,

    /// How long `acquire` may wait in wait mode
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Delay before a task that could not be admitted is claimable again
    #[serde(default = "default_requeue_delay_ms")]
    pub requeue_delay_ms: u64,

    /// Sliding window for counting CAPTCHA / 403 strikes
    #[serde(default = "default_strike_window_secs")]
    pub strike_window_secs: u64,

    /// Strikes in the window that degrade a host
    #[serde(default = "default_degrade_threshold")]
    pub degrade_threshold: u32,

    /// Strikes in the window that block a host
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,

    /// How long a blocked host rejects acquisitions
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Multiplier applied to requests-per-minute while degraded
    #[serde(default = "default_degraded_rate_factor")]
    pub degraded_rate_factor: f64,
}

const fn default_acquire_timeout_ms() -> u64 {
    30_000
}

const fn default_requeue_delay_ms() -> u64 {
    15_000
}

const fn default_strike_window_secs() -> u64 {
    600
}

const fn default_degrade_threshold() -> u32 {
    3
}

const fn default_block_threshold() -> u32 {
    6
}

const fn default_cooldown_secs() -> u64 {
    900
}

const fn default_degraded_rate_factor() -> f64 {
    0.5
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            default_policy: RateLimitPolicy::default(),
            domains: vec![],
            mode: AdmissionMode::default(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            requeue_delay_ms: default_requeue_delay_ms(),
            strike_window_secs: default_strike_window_secs(),
            degrade_threshold: default_degrade_threshold(),
            block_threshold: default_block_threshold(),
            cooldown_secs: default_cooldown_secs(),
            degraded_rate_factor: default_degraded_rate_factor(),
        }
    }
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BrowserConfig {
    /// W3C WebDriver endpoint (chromedriver, geckodriver, selenium)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Per-request timeout for WebDriver commands, including navigation
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// How long to wait for a vendor success indicator after submit
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Poll interval while waiting for the success indicator
    #[serde(default = "default_confirm_poll_ms")]
    pub poll_interval_ms: u64,
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_navigation_timeout_ms() -> u64 {
    30_000
}

const fn default_submit_timeout_ms() -> u64 {
    60_000
}

const fn default_confirm_poll_ms() -> u64 {
    500
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: true,
            navigation_timeout_ms: default_navigation_timeout_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
            poll_interval_ms: default_confirm_poll_ms(),
        }
    }
}

/// Artifact storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: String,
}

fn default_artifact_dir() -> String {
    ".autoapply/artifacts".to_string()
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    /// POST completion events here; events are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,
}
