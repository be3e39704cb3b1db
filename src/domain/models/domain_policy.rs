//! Admission policy records for destination hosts.

use serde::{Deserialize, Serialize};

/// Rate ceiling for one destination host. Both limits apply; the stricter
/// one governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests_per_minute: u32,
    pub max_concurrent: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            max_concurrent: 2,
        }
    }
}

/// Health of a destination host as observed by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Healthy,
    /// Rate ceiling tightened after repeated blocks
    Degraded,
    /// New acquisitions rejected until a cooldown elapses
    Blocked,
}

impl Default for DomainStatus {
    fn default() -> Self {
        Self::Healthy
    }
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission record for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub host: String,
    pub rate_limit_policy: RateLimitPolicy,
    pub last_status: DomainStatus,
}

impl Domain {
    pub fn new(host: impl Into<String>, rate_limit_policy: RateLimitPolicy) -> Self {
        Self {
            host: host.into(),
            rate_limit_policy,
            last_status: DomainStatus::Healthy,
        }
    }
}
