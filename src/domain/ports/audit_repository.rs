use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::AuditLogEntry;

/// Append-only storage for audit entries.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append one entry. `(task_id, sequence)` is unique.
    async fn append(&self, entry: &AuditLogEntry) -> DomainResult<()>;

    /// All entries for a task in sequence order
    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<AuditLogEntry>>;

    /// Most recent entry for a task
    async fn last_entry(&self, task_id: Uuid) -> DomainResult<Option<AuditLogEntry>>;
}
