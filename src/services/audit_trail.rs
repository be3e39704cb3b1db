//! Append-only step logger scoped to one task run.
//!
//! A trail continues the task's existing sequence, so entries from every
//! attempt of a task form one ordered stream. Timestamps never go backwards
//! even if the wall clock does.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AuditLogEntry, AuditPayload, AuditStep};
use crate::domain::ports::AuditRepository;

struct TrailCursor {
    next_sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Ordered audit writer for one task and attempt.
pub struct AuditTrail {
    repo: Arc<dyn AuditRepository>,
    task_id: Uuid,
    attempt: u32,
    cursor: Mutex<TrailCursor>,
}

impl AuditTrail {
    /// Open a trail that appends after the task's last stored entry.
    pub async fn open(
        repo: Arc<dyn AuditRepository>,
        task_id: Uuid,
        attempt: u32,
    ) -> DomainResult<Self> {
        let last = repo.last_entry(task_id).await?;
        let cursor = TrailCursor {
            next_sequence: last.as_ref().map_or(1, |e| e.sequence + 1),
            last_timestamp: last.map(|e| e.timestamp),
        };
        Ok(Self {
            repo,
            task_id,
            attempt,
            cursor: Mutex::new(cursor),
        })
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Append one entry.
    pub async fn record(&self, step: AuditStep, payload: AuditPayload) -> DomainResult<()> {
        // Held across the write so concurrent callers cannot interleave.
        let mut cursor = self.cursor.lock().await;

        let now = Utc::now();
        let timestamp = match cursor.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };

        let entry = AuditLogEntry {
            task_id: self.task_id,
            attempt: self.attempt,
            sequence: cursor.next_sequence,
            step,
            payload,
            timestamp,
        };
        self.repo.append(&entry).await?;

        cursor.next_sequence += 1;
        cursor.last_timestamp = Some(timestamp);

        info!(
            task_id = %self.task_id,
            attempt = self.attempt,
            sequence = entry.sequence,
            step = %step,
            "audit step"
        );
        Ok(())
    }

    /// Record a step, logging instead of failing when the write fails.
    ///
    /// Agents use this so a storage hiccup never turns into an unclassified
    /// error inside a run.
    pub async fn note(&self, step: AuditStep, payload: AuditPayload) {
        if let Err(err) = self.record(step, payload).await {
            tracing::warn!(
                task_id = %self.task_id,
                step = %step,
                error = %err,
                "failed to write audit entry"
            );
        }
    }
}
