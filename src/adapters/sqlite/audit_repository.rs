//! SQLite implementation of the AuditRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json_or_default, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AuditLogEntry, AuditStep};
use crate::domain::ports::AuditRepository;

#[derive(Clone)]
pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, entry: &AuditLogEntry) -> DomainResult<()> {
        let payload = serde_json::to_string(&entry.payload)?;

        let result = sqlx::query(
            r#"INSERT INTO audit_log (task_id, sequence, attempt, step, payload, timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.task_id.to_string())
        .bind(entry.sequence as i64)
        .bind(i64::from(entry.attempt))
        .bind(entry.step.as_str())
        .bind(payload)
        .bind(format_datetime(entry.timestamp))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(DomainError::ConcurrencyConflict {
                    entity: "audit_log".to_string(),
                    id: format!("{}#{}", entry.task_id, entry.sequence),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<AuditLogEntry>> {
        let rows: Vec<AuditRow> =
            sqlx::query_as("SELECT * FROM audit_log WHERE task_id = ? ORDER BY sequence ASC")
                .bind(task_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn last_entry(&self, task_id: Uuid) -> DomainResult<Option<AuditLogEntry>> {
        let row: Option<AuditRow> = sqlx::query_as(
            "SELECT * FROM audit_log WHERE task_id = ? ORDER BY sequence DESC LIMIT 1",
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    task_id: String,
    sequence: i64,
    attempt: i64,
    step: String,
    payload: Option<String>,
    timestamp: String,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = DomainError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let step = AuditStep::from_str(&row.step)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid audit step: {}", row.step)))?;

        Ok(AuditLogEntry {
            task_id: parse_uuid(&row.task_id)?,
            attempt: u32::try_from(row.attempt)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            sequence: u64::try_from(row.sequence)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            step,
            payload: parse_json_or_default(row.payload)?,
            timestamp: parse_datetime(&row.timestamp)?,
        })
    }
}
