//! Audit log entries.
//!
//! Every automation step and every task transition writes one entry. Entries
//! for a task are append-only and ordered by `sequence`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Closed set of audit step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStep {
    // Agent steps
    Navigate,
    CaptchaDetected,
    FillPersonalInfo,
    UploadResume,
    Submit,
    Error,

    // Task transitions
    Dispatch,
    Completed,
    CaptchaBlocked,
    AttemptFailed,
    FailedPermanent,
    Retry,
    Cancelled,

    // Admission control
    AdmissionDeferred,
}

impl AuditStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::CaptchaDetected => "captcha_detected",
            Self::FillPersonalInfo => "fill_personal_info",
            Self::UploadResume => "upload_resume",
            Self::Submit => "submit",
            Self::Error => "error",
            Self::Dispatch => "dispatch",
            Self::Completed => "completed",
            Self::CaptchaBlocked => "captcha_blocked",
            Self::AttemptFailed => "attempt_failed",
            Self::FailedPermanent => "failed_permanent",
            Self::Retry => "retry",
            Self::Cancelled => "cancelled",
            Self::AdmissionDeferred => "admission_deferred",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "navigate" => Some(Self::Navigate),
            "captcha_detected" => Some(Self::CaptchaDetected),
            "fill_personal_info" => Some(Self::FillPersonalInfo),
            "upload_resume" => Some(Self::UploadResume),
            "submit" => Some(Self::Submit),
            "error" => Some(Self::Error),
            "dispatch" => Some(Self::Dispatch),
            "completed" => Some(Self::Completed),
            "captcha_blocked" => Some(Self::CaptchaBlocked),
            "attempt_failed" => Some(Self::AttemptFailed),
            "failed_permanent" => Some(Self::FailedPermanent),
            "retry" => Some(Self::Retry),
            "cancelled" => Some(Self::Cancelled),
            "admission_deferred" => Some(Self::AdmissionDeferred),
            _ => None,
        }
    }

    /// Whether the step records interaction with the vendor's form.
    pub fn is_form_interaction(&self) -> bool {
        matches!(self, Self::FillPersonalInfo | Self::UploadResume | Self::Submit)
    }
}

impl std::fmt::Display for AuditStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured key/value payload of an audit entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditPayload(BTreeMap<String, Value>);

impl AuditPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert only when a value is present.
    pub fn with_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub task_id: Uuid,
    /// Attempt the entry belongs to (0 outside an attempt)
    pub attempt: u32,
    /// Per-task ordering key
    pub sequence: u64,
    pub step: AuditStep,
    pub payload: AuditPayload,
    pub timestamp: DateTime<Utc>,
}
