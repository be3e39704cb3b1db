//! Completion event sinks.

pub mod log;
pub mod webhook;

use std::sync::Arc;

pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

use crate::domain::models::NotificationConfig;
use crate::domain::ports::{NotifyError, Notifier};

/// Webhook notifier when a URL is configured, otherwise log-only.
pub fn notifier_from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Arc::new(WebhookNotifier::new(url)?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}
