//! Completion events handed to the notification collaborator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::Job;
use super::task::{ApplicationTask, TaskStatus};

/// Emitted once when a task reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub job_id: Uuid,
    pub outcome: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Only set for CAPTCHA blocks so a human can finish the form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_url: Option<String>,
}

impl CompletionEvent {
    pub fn for_task(task: &ApplicationTask, job: Option<&Job>) -> Self {
        let apply_url = match task.status {
            TaskStatus::CaptchaDetected => job.map(|j| j.apply_url.clone()),
            _ => None,
        };
        let error = match task.status {
            TaskStatus::Submitted => None,
            _ => task.last_error.clone(),
        };
        Self {
            task_id: task.id,
            user_id: task.user_id,
            job_id: task.job_id,
            outcome: task.status,
            error,
            apply_url,
        }
    }
}
