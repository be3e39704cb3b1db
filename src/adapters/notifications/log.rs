use async_trait::async_trait;
use tracing::info;

use crate::domain::models::CompletionEvent;
use crate::domain::ports::{NotifyError, Notifier};

/// Writes completion events to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        info!(
            task_id = %event.task_id,
            user_id = %event.user_id,
            job_id = %event.job_id,
            outcome = %event.outcome,
            error = event.error.as_deref().unwrap_or(""),
            apply_url = event.apply_url.as_deref().unwrap_or(""),
            "application completed"
        );
        Ok(())
    }
}
