use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::CompletionEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification endpoint rejected event with status {0}")]
    Rejected(u16),
}

/// Sink for completion events. Delivery is at-least-once; receivers
/// de-duplicate on `task_id`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &CompletionEvent) -> Result<(), NotifyError>;
}
