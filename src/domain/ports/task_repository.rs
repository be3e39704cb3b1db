use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ApplicationTask, TaskStatus};

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub user_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub limit: Option<usize>,
}

/// Repository port for application task persistence
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task
    async fn create(&self, task: &ApplicationTask) -> DomainResult<()>;

    /// Get a task by ID
    async fn get(&self, id: Uuid) -> DomainResult<Option<ApplicationTask>>;

    /// Persist a mutated task.
    ///
    /// Fails with a concurrency conflict when the stored version differs from
    /// `task.version`; on success `task.version` is advanced.
    async fn update(&self, task: &mut ApplicationTask) -> DomainResult<()>;

    /// List tasks, oldest first
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<ApplicationTask>>;

    /// The non-terminal task for a (user, job) pair, if any
    async fn find_active(&self, user_id: Uuid, job_id: Uuid)
        -> DomainResult<Option<ApplicationTask>>;

    /// Atomically claim the oldest due, unclaimed queued task for `worker`
    async fn claim_next(
        &self,
        worker: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<ApplicationTask>>;

    /// Give a claimed queued task back, not claimable before `not_before`
    async fn release_claim(
        &self,
        id: Uuid,
        worker: &str,
        not_before: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Drop claims on queued tasks taken at or before `claimed_before`.
    ///
    /// Returns how many tasks became claimable again.
    async fn release_stale_claims(&self, claimed_before: DateTime<Utc>) -> DomainResult<u64>;

    /// Failed tasks whose backoff has elapsed, oldest first
    async fn due_retries(&self, now: DateTime<Utc>, limit: usize)
        -> DomainResult<Vec<ApplicationTask>>;

    /// Task counts grouped by status
    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>>;
}
