//! Application task domain model.
//!
//! An application task is one attempt lifecycle for a (candidate, job) pair.
//! It is created `queued` by the intake collaborator and then moved through
//! its states exclusively by the executor and scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Status of an application task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be claimed by a worker
    Queued,
    /// An agent run is in flight
    Processing,
    /// The vendor confirmed the submission
    Submitted,
    /// A CAPTCHA blocked automation; a human has to finish the application
    CaptchaDetected,
    /// The last attempt failed transiently; a retry is pending
    Failed,
    /// Retries are exhausted or the failure was structural
    FailedPermanent,
    /// Withdrawn between attempts
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const fn all() -> [Self; 7] {
        [
            Self::Queued,
            Self::Processing,
            Self::Submitted,
            Self::CaptchaDetected,
            Self::Failed,
            Self::FailedPermanent,
            Self::Cancelled,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Submitted => "submitted",
            Self::CaptchaDetected => "captcha_detected",
            Self::Failed => "failed",
            Self::FailedPermanent => "failed_permanent",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "submitted" => Some(Self::Submitted),
            "captcha_detected" | "captcha" => Some(Self::CaptchaDetected),
            "failed" => Some(Self::Failed),
            "failed_permanent" => Some(Self::FailedPermanent),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no further automated transition).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::CaptchaDetected | Self::FailedPermanent | Self::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Queued => vec![Self::Processing, Self::Cancelled],
            Self::Processing => vec![
                Self::Submitted,
                Self::CaptchaDetected,
                Self::Failed,
                Self::FailedPermanent,
            ],
            Self::Failed => vec![Self::Queued, Self::FailedPermanent, Self::Cancelled],
            Self::Submitted | Self::CaptchaDetected | Self::FailedPermanent | Self::Cancelled => {
                vec![]
            }
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One application attempt lifecycle for a (user, job) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationTask {
    /// Unique identifier
    pub id: Uuid,
    /// Candidate the application is submitted for
    pub user_id: Uuid,
    /// Job being applied to
    pub job_id: Uuid,
    /// Current status
    pub status: TaskStatus,
    /// Number of dispatched attempts
    pub attempt_count: u32,
    /// Most recent failure message
    pub last_error: Option<String>,
    /// Worker currently holding the task
    pub assigned_worker: Option<String>,
    /// Earliest time the task may be claimed again
    pub not_before: Option<DateTime<Utc>>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
    /// Version for optimistic locking
    pub version: u64,
}

impl ApplicationTask {
    /// Create a new queued task.
    pub fn new(user_id: Uuid, job_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            job_id,
            status: TaskStatus::default(),
            attempt_count: 0,
            last_error: None,
            assigned_worker: None,
            not_before: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status.
    ///
    /// Entering `processing` counts a new attempt. Leaving `processing`
    /// clears the worker assignment.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> DomainResult<()> {
        if !self.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
                reason: "transition not allowed by the task state machine".to_string(),
            });
        }

        let from = self.status;
        self.status = new_status;
        self.updated_at = Utc::now();

        match (from, new_status) {
            (TaskStatus::Queued, TaskStatus::Processing) => {
                self.attempt_count += 1;
                self.not_before = None;
            }
            (TaskStatus::Processing, _) => self.assigned_worker = None,
            (TaskStatus::Failed, TaskStatus::Queued) => self.not_before = None,
            _ => {}
        }

        Ok(())
    }

    /// Move a queued task to `processing` on behalf of `worker`.
    pub fn start_attempt(&mut self, worker: impl Into<String>) -> DomainResult<()> {
        self.transition_to(TaskStatus::Processing)?;
        self.assigned_worker = Some(worker.into());
        Ok(())
    }

    /// Record a failure and move to `status`.
    pub fn fail(&mut self, status: TaskStatus, error: impl Into<String>) -> DomainResult<()> {
        self.transition_to(status)?;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Number of retries already consumed.
    pub fn retries_used(&self) -> u32 {
        self.attempt_count.saturating_sub(1)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the task may be claimed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |t| t <= now)
    }
}
