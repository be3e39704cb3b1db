//! HTTP webhook notifier.
//!
//! POSTs each completion event as JSON. Any non-2xx answer is a delivery
//! failure; the receiver de-duplicates on `task_id`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::domain::models::CompletionEvent;
use crate::domain::ports::{NotifyError, Notifier};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!(task_id = %event.task_id, outcome = %event.outcome, "completion event delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;
    use mockito::Matcher;
    use uuid::Uuid;

    fn event() -> CompletionEvent {
        CompletionEvent {
            task_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            outcome: TaskStatus::CaptchaDetected,
            error: Some("captcha indicator found: hcaptcha".into()),
            apply_url: Some("https://jobs.lever.co/acme/1/apply".into()),
        }
    }

    #[tokio::test]
    async fn test_posts_event_json() {
        let mut server = mockito::Server::new_async().await;
        let event = event();
        let mock = server
            .mock("POST", "/hooks/applications")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "task_id": event.task_id.to_string(),
                "outcome": "captcha_detected",
                "apply_url": "https://jobs.lever.co/acme/1/apply",
            })))
            .with_status(204)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hooks/applications", server.url())).unwrap();
        notifier.notify(&event).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        let err = notifier.notify(&event()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(500)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook").unwrap();
        let err = notifier.notify(&event()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
    }
}
