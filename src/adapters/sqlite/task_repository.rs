//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApplicationTask, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &ApplicationTask) -> DomainResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO application_tasks (id, user_id, job_id, status, attempt_count,
               last_error, assigned_worker, not_before, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.user_id.to_string())
        .bind(task.job_id.to_string())
        .bind(task.status.as_str())
        .bind(i64::from(task.attempt_count))
        .bind(&task.last_error)
        .bind(&task.assigned_worker)
        .bind(task.not_before.map(format_datetime))
        .bind(task.version as i64)
        .bind(format_datetime(task.created_at))
        .bind(format_datetime(task.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(DomainError::DuplicateActiveTask {
                user_id: task.user_id,
                job_id: task.job_id,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ApplicationTask>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM application_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, task: &mut ApplicationTask) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE application_tasks SET status = ?, attempt_count = ?, last_error = ?,
               assigned_worker = ?, not_before = ?, updated_at = ?, version = version + 1,
               claimed_at = CASE WHEN ? IS NULL THEN NULL ELSE claimed_at END
               WHERE id = ? AND version = ?"#,
        )
        .bind(task.status.as_str())
        .bind(i64::from(task.attempt_count))
        .bind(&task.last_error)
        .bind(&task.assigned_worker)
        .bind(task.not_before.map(format_datetime))
        .bind(format_datetime(task.updated_at))
        .bind(&task.assigned_worker)
        .bind(task.id.to_string())
        .bind(task.version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(task.id).await? {
                Some(_) => Err(DomainError::ConcurrencyConflict {
                    entity: "application_task".to_string(),
                    id: task.id.to_string(),
                }),
                None => Err(DomainError::TaskNotFound(task.id)),
            };
        }

        task.version += 1;
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<ApplicationTask>> {
        let mut query = String::from("SELECT * FROM application_tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(user_id) = &filter.user_id {
            query.push_str(" AND user_id = ?");
            bindings.push(user_id.to_string());
        }
        if let Some(job_id) = &filter.job_id {
            query.push_str(" AND job_id = ?");
            bindings.push(job_id.to_string());
        }

        query.push_str(" ORDER BY created_at, rowid");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_active(&self, user_id: Uuid, job_id: Uuid) -> DomainResult<Option<ApplicationTask>> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM application_tasks
               WHERE user_id = ? AND job_id = ? AND status IN ('queued', 'processing', 'failed')
               LIMIT 1"#,
        )
        .bind(user_id.to_string())
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn claim_next(&self, worker: &str, now: DateTime<Utc>) -> DomainResult<Option<ApplicationTask>> {
        // Single statement: two workers can never claim the same row.
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE application_tasks
               SET assigned_worker = ?, claimed_at = ?, version = version + 1
               WHERE id = (
                   SELECT id FROM application_tasks
                   WHERE status = 'queued'
                     AND assigned_worker IS NULL
                     AND (not_before IS NULL OR not_before <= ?)
                   ORDER BY created_at, rowid
                   LIMIT 1
               )
               AND assigned_worker IS NULL
               RETURNING *"#,
        )
        .bind(worker)
        .bind(format_datetime(now))
        .bind(format_datetime(now))
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn release_claim(&self, id: Uuid, worker: &str, not_before: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE application_tasks
               SET assigned_worker = NULL, claimed_at = NULL, not_before = ?,
                   version = version + 1
               WHERE id = ? AND assigned_worker = ? AND status = 'queued'"#,
        )
        .bind(format_datetime(not_before))
        .bind(id.to_string())
        .bind(worker)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ConcurrencyConflict {
                entity: "application_task".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn release_stale_claims(&self, claimed_before: DateTime<Utc>) -> DomainResult<u64> {
        // Rows claimed before claimed_at existed have no timestamp and count as stale.
        let result = sqlx::query(
            r#"UPDATE application_tasks
               SET assigned_worker = NULL, claimed_at = NULL, version = version + 1
               WHERE status = 'queued'
                 AND assigned_worker IS NOT NULL
                 AND (claimed_at IS NULL OR claimed_at <= ?)"#,
        )
        .bind(format_datetime(claimed_before))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<ApplicationTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM application_tasks
               WHERE status = 'failed' AND (not_before IS NULL OR not_before <= ?)
               ORDER BY not_before, created_at, rowid
               LIMIT ?"#,
        )
        .bind(format_datetime(now))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM application_tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = TaskStatus::from_str(&status)
                .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {status}")))?;
            counts.insert(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    user_id: String,
    job_id: String,
    status: String,
    attempt_count: i64,
    last_error: Option<String>,
    assigned_worker: Option<String>,
    not_before: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for ApplicationTask {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        Ok(ApplicationTask {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            job_id: parse_uuid(&row.job_id)?,
            status,
            attempt_count: u32::try_from(row.attempt_count)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            last_error: row.last_error,
            assigned_worker: row.assigned_worker,
            not_before: parse_optional_datetime(row.not_before)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            version: u64::try_from(row.version)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Duration;

    async fn setup_test_repo() -> SqliteTaskRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteTaskRepository::new(pool)
    }

    fn task() -> ApplicationTask {
        ApplicationTask::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let repo = setup_test_repo().await;
        let task = task();

        repo.create(&task).await.unwrap();

        let retrieved = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, task.id);
        assert_eq!(retrieved.status, TaskStatus::Queued);
        assert_eq!(retrieved.attempt_count, 0);
        assert_eq!(retrieved.version, 1);
    }

    #[tokio::test]
    async fn test_one_active_task_per_pair() {
        let repo = setup_test_repo().await;
        let mut first = task();
        repo.create(&first).await.unwrap();

        let duplicate = ApplicationTask::new(first.user_id, first.job_id);
        assert!(matches!(
            repo.create(&duplicate).await,
            Err(DomainError::DuplicateActiveTask { .. })
        ));

        first.transition_to(TaskStatus::Cancelled).unwrap();
        repo.update(&mut first).await.unwrap();
        repo.create(&duplicate).await.unwrap();

        let active = repo.find_active(first.user_id, first.job_id).await.unwrap().unwrap();
        assert_eq!(active.id, duplicate.id);
    }

    #[tokio::test]
    async fn test_update_detects_stale_version() {
        let repo = setup_test_repo().await;
        let task = task();
        repo.create(&task).await.unwrap();

        let mut a = repo.get(task.id).await.unwrap().unwrap();
        let mut b = a.clone();

        a.start_attempt("w1").unwrap();
        repo.update(&mut a).await.unwrap();
        assert_eq!(a.version, 2);

        b.transition_to(TaskStatus::Cancelled).unwrap();
        assert!(matches!(
            repo.update(&mut b).await,
            Err(DomainError::ConcurrencyConflict { .. })
        ));

        let mut missing = ApplicationTask::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(repo.update(&mut missing).await, Err(DomainError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let repo = setup_test_repo().await;
        let mut first = task();
        let mut second = task();
        second.created_at = first.created_at + Duration::milliseconds(10);
        first.updated_at = first.created_at;
        repo.create(&second).await.unwrap();
        repo.create(&first).await.unwrap();

        let now = Utc::now() + Duration::seconds(1);
        let claimed = repo.claim_next("w1", now).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.assigned_worker.as_deref(), Some("w1"));
        assert_eq!(claimed.version, 2);

        let next = repo.claim_next("w2", now).await.unwrap().unwrap();
        assert_eq!(next.id, second.id);
        assert!(repo.claim_next("w3", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_claim_defers_task() {
        let repo = setup_test_repo().await;
        let task = task();
        repo.create(&task).await.unwrap();

        let now = Utc::now();
        repo.claim_next("w1", now).await.unwrap().unwrap();
        repo.release_claim(task.id, "w1", now + Duration::seconds(15)).await.unwrap();

        assert!(repo.claim_next("w1", now).await.unwrap().is_none());
        let later = repo.claim_next("w1", now + Duration::seconds(16)).await.unwrap();
        assert_eq!(later.map(|t| t.id), Some(task.id));

        assert!(repo.release_claim(task.id, "someone-else", now).await.is_err());
    }

    #[tokio::test]
    async fn test_abandoned_claim_becomes_claimable_again() {
        let repo = setup_test_repo().await;
        let task = task();
        repo.create(&task).await.unwrap();

        let claimed_at = Utc::now();
        repo.claim_next("worker-111", claimed_at).await.unwrap().unwrap();

        // Within the lease the claim stands.
        let released = repo
            .release_stale_claims(claimed_at - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(released, 0);
        assert!(repo.claim_next("worker-222", claimed_at).await.unwrap().is_none());

        let later = claimed_at + Duration::days(30);
        let released = repo
            .release_stale_claims(later - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(released, 1);

        let reclaimed = repo.claim_next("worker-222", later).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, task.id);
        assert_eq!(reclaimed.status, TaskStatus::Queued);
        assert_eq!(reclaimed.assigned_worker.as_deref(), Some("worker-222"));
    }

    #[tokio::test]
    async fn test_stale_claim_release_ignores_running_tasks() {
        let repo = setup_test_repo().await;
        let task = task();
        repo.create(&task).await.unwrap();

        let now = Utc::now();
        let mut claimed = repo.claim_next("w1", now).await.unwrap().unwrap();
        claimed.start_attempt("w1").unwrap();
        repo.update(&mut claimed).await.unwrap();

        let released = repo
            .release_stale_claims(now + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(released, 0);
        let stored = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Processing);
        assert_eq!(stored.assigned_worker.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_due_retries_and_counts() {
        let repo = setup_test_repo().await;
        let now = Utc::now();

        let mut due = task();
        due.start_attempt("w").unwrap();
        due.fail(TaskStatus::Failed, "timeout").unwrap();
        due.not_before = Some(now - Duration::seconds(1));
        repo.create(&due).await.unwrap();

        let mut later = task();
        later.start_attempt("w").unwrap();
        later.fail(TaskStatus::Failed, "timeout").unwrap();
        later.not_before = Some(now + Duration::minutes(5));
        repo.create(&later).await.unwrap();

        repo.create(&task()).await.unwrap();

        let retries = repo.due_retries(now, 10).await.unwrap();
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].id, due.id);
        assert_eq!(retries[0].last_error.as_deref(), Some("timeout"));

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&TaskStatus::Failed), Some(&2));
        assert_eq!(counts.get(&TaskStatus::Queued), Some(&1));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = setup_test_repo().await;
        let user = Uuid::new_v4();
        for _ in 0..3 {
            repo.create(&ApplicationTask::new(user, Uuid::new_v4())).await.unwrap();
        }
        repo.create(&task()).await.unwrap();

        let mine = repo
            .list(TaskFilter { user_id: Some(user), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(mine.len(), 3);

        let limited = repo
            .list(TaskFilter { limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
