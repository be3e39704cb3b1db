//! Inbound surface for application tasks: creation, polling, audit
//! queries and cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApplicationTask, AuditLogEntry, AuditPayload, AuditStep, TaskStatus};
use crate::domain::ports::{AuditRepository, JobCatalog, ProfileDirectory, TaskFilter, TaskRepository};
use crate::services::audit_trail::AuditTrail;

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    audit: Arc<dyn AuditRepository>,
    jobs: Arc<dyn JobCatalog>,
    profiles: Arc<dyn ProfileDirectory>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        audit: Arc<dyn AuditRepository>,
        jobs: Arc<dyn JobCatalog>,
        profiles: Arc<dyn ProfileDirectory>,
    ) -> Self {
        Self {
            tasks,
            audit,
            jobs,
            profiles,
        }
    }

    /// Queue an application of `user_id` to `job_id`.
    ///
    /// Fails when the job or candidate is unknown, or when the pair already
    /// has a non-terminal task.
    pub async fn create_task(&self, user_id: Uuid, job_id: Uuid) -> DomainResult<ApplicationTask> {
        if self.jobs.get_job(job_id).await?.is_none() {
            return Err(DomainError::JobNotFound(job_id));
        }
        if self.profiles.get_profile(user_id).await?.is_none() {
            return Err(DomainError::ProfileNotFound(user_id));
        }
        if self.tasks.find_active(user_id, job_id).await?.is_some() {
            return Err(DomainError::DuplicateActiveTask { user_id, job_id });
        }

        let task = ApplicationTask::new(user_id, job_id);
        self.tasks.create(&task).await?;
        info!(task_id = %task.id, user_id = %user_id, job_id = %job_id, "application task queued");
        Ok(task)
    }

    pub async fn get_task(&self, id: Uuid) -> DomainResult<ApplicationTask> {
        self.tasks.get(id).await?.ok_or(DomainError::TaskNotFound(id))
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<ApplicationTask>> {
        self.tasks.list(filter).await
    }

    /// Audit entries of a task in order.
    pub async fn audit_log(&self, id: Uuid) -> DomainResult<Vec<AuditLogEntry>> {
        self.get_task(id).await?;
        self.audit.list_for_task(id).await
    }

    /// Withdraw a task between attempts.
    pub async fn cancel_task(&self, id: Uuid, reason: Option<&str>) -> DomainResult<ApplicationTask> {
        let mut task = self.get_task(id).await?;
        let previous = task.status;
        task.transition_to(TaskStatus::Cancelled)?;
        task.assigned_worker = None;
        task.not_before = None;
        self.tasks.update(&mut task).await?;

        let trail = AuditTrail::open(self.audit.clone(), id, 0).await?;
        trail
            .record(
                AuditStep::Cancelled,
                AuditPayload::new()
                    .with("previous_status", previous.as_str())
                    .with_opt("reason", reason),
            )
            .await?;

        info!(task_id = %id, previous = %previous, "application task cancelled");
        Ok(task)
    }

    pub async fn status_counts(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        self.tasks.count_by_status().await
    }
}
