//! Protocol tests for the vendor agents against scripted sessions.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use super::*;
use crate::adapters::artifacts::FilesystemArtifactStore;
use crate::adapters::browser::{ScriptedAction, ScriptedBrowser, ScriptedRun};
use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAuditRepository};
use crate::domain::models::{AgentOutcome, AuditStep, CandidateProfile, FailureKind};
use crate::domain::ports::{Agent, ApplyRequest, AuditRepository, BrowserError};
use crate::services::audit_trail::AuditTrail;

const GREENHOUSE_URL: &str = "https://boards.greenhouse.io/acme/jobs/123";

struct Harness {
    browser: Arc<ScriptedBrowser>,
    artifacts: Arc<FilesystemArtifactStore>,
    audit_repo: Arc<SqliteAuditRepository>,
    _dir: TempDir,
}

impl Harness {
    async fn new(browser: ScriptedBrowser) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = create_migrated_test_pool().await.unwrap();
        Self {
            browser: Arc::new(browser),
            artifacts: Arc::new(FilesystemArtifactStore::new(dir.path())),
            audit_repo: Arc::new(SqliteAuditRepository::new(pool)),
            _dir: dir,
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            submit_timeout: Duration::from_millis(60),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn greenhouse(&self) -> GreenhouseAgent {
        GreenhouseAgent::new(self.browser.clone(), self.artifacts.clone(), Self::settings())
    }

    fn lever(&self) -> LeverAgent {
        LeverAgent::new(self.browser.clone(), self.artifacts.clone(), Self::settings())
    }

    fn generic(&self) -> GenericAgent {
        GenericAgent::new(self.browser.clone(), self.artifacts.clone(), Self::settings())
    }

    async fn trail(&self, task_id: Uuid) -> AuditTrail {
        AuditTrail::open(self.audit_repo.clone(), task_id, 1).await.unwrap()
    }

    async fn steps(&self, task_id: Uuid) -> Vec<AuditStep> {
        self.audit_repo
            .list_for_task(task_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.step)
            .collect()
    }
}

fn profile() -> CandidateProfile {
    CandidateProfile {
        user_id: Uuid::new_v4(),
        full_name: "Ada Lovelace".into(),
        email: Some("ada@example.com".into()),
        phone: Some("+44 20 7946 0000".into()),
        location: None,
        resume_file_reference: Some("/resumes/ada.pdf".into()),
    }
}

fn request<'a>(task_id: Uuid, url: &'a str, profile: &'a CandidateProfile) -> ApplyRequest<'a> {
    ApplyRequest {
        task_id,
        apply_url: url,
        profile,
        resume: profile.resume_file_reference.as_deref(),
    }
}

#[tokio::test]
async fn test_greenhouse_happy_path() {
    let harness = Harness::new(ScriptedBrowser::accepting()).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .greenhouse()
        .apply(request(task_id, GREENHOUSE_URL, &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::Submitted);
    assert_eq!(
        harness.steps(task_id).await,
        vec![
            AuditStep::Navigate,
            AuditStep::FillPersonalInfo,
            AuditStep::UploadResume,
            AuditStep::Submit
        ]
    );

    let sessions = harness.browser.sessions().await;
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.navigations, vec![GREENHOUSE_URL.to_string()]);
    assert!(session.filled.contains(&("#first_name".into(), "Ada".into())));
    assert!(session.filled.contains(&("#last_name".into(), "Lovelace".into())));
    assert_eq!(
        session.uploads,
        vec![("input[type=file]#resume".to_string(), "/resumes/ada.pdf".to_string())]
    );
    assert_eq!(session.clicks, vec!["#submit_app".to_string()]);
    assert!(session.closed);
}

#[tokio::test]
async fn test_audit_names_fields_without_values() {
    let harness = Harness::new(ScriptedBrowser::accepting()).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    harness
        .greenhouse()
        .apply(request(task_id, GREENHOUSE_URL, &profile), &trail)
        .await;

    let entries = harness.audit_repo.list_for_task(task_id).await.unwrap();
    let fill = entries
        .iter()
        .find(|e| e.step == AuditStep::FillPersonalInfo)
        .unwrap();
    let json = serde_json::to_string(&fill.payload).unwrap();
    assert!(json.contains("first_name"));
    assert!(json.contains("location"), "profile without location is listed as skipped");
    assert!(!json.contains("ada@example.com"));
}

#[tokio::test]
async fn test_captcha_stops_before_any_input() {
    let browser = ScriptedBrowser::new(
        ScriptedRun::page(r#"<div class="g-recaptcha" data-sitekey="k"></div>"#)
            .with_elements(["#first_name", "#last_name", "#email", "#submit_app"]),
    );
    let harness = Harness::new(browser).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .greenhouse()
        .apply(request(task_id, GREENHOUSE_URL, &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::CaptchaDetected);
    assert!(result.artifact.is_some());

    let steps = harness.steps(task_id).await;
    assert_eq!(steps, vec![AuditStep::Navigate, AuditStep::CaptchaDetected]);
    assert!(!steps.iter().any(AuditStep::is_form_interaction));

    let session = &harness.browser.sessions().await[0];
    assert!(session.filled.is_empty());
    assert!(session.clicks.is_empty());
    assert_eq!(session.screenshots, 1);
    assert!(session.closed);
}

#[tokio::test]
async fn test_missing_required_field_is_terminal() {
    let browser = ScriptedBrowser::new(
        ScriptedRun::page("<form></form>").with_elements(["#first_name", "#last_name"]),
    );
    let harness = Harness::new(browser).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .greenhouse()
        .apply(request(task_id, GREENHOUSE_URL, &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::TerminalFailure);
    assert_eq!(result.failure, Some(FailureKind::RequiredFieldMissing));
    assert!(result.artifact.is_some());
    assert_eq!(harness.steps(task_id).await.last(), Some(&AuditStep::Error));
    assert!(harness.browser.sessions().await[0].closed);
}

#[tokio::test]
async fn test_missing_confirmation_times_out_transiently() {
    let browser = ScriptedBrowser::new(ScriptedRun::page("<form>apply</form>").with_elements([
        "#first_name",
        "#last_name",
        "#email",
        "#phone",
        "input[type=file]#resume",
        "#submit_app",
    ]));
    let harness = Harness::new(browser).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .greenhouse()
        .apply(request(task_id, GREENHOUSE_URL, &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::TransientFailure);
    assert_eq!(result.failure, Some(FailureKind::Timeout));
    let steps = harness.steps(task_id).await;
    assert!(!steps.contains(&AuditStep::Submit));
    assert_eq!(steps.last(), Some(&AuditStep::Error));
}

#[tokio::test]
async fn test_access_denied_page_is_forbidden() {
    let harness =
        Harness::new(ScriptedBrowser::new(ScriptedRun::page("<h1>403 Forbidden</h1>"))).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .lever()
        .apply(request(task_id, "https://jobs.lever.co/acme/1", &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::TransientFailure);
    assert_eq!(result.failure, Some(FailureKind::Forbidden));
}

#[tokio::test]
async fn test_lever_requires_resume() {
    let harness = Harness::new(ScriptedBrowser::accepting()).await;
    let mut profile = profile();
    profile.resume_file_reference = None;
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .lever()
        .apply(request(task_id, "https://jobs.lever.co/acme/1", &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::TerminalFailure);
    assert_eq!(result.failure, Some(FailureKind::RequiredFieldMissing));
    assert!(harness.browser.sessions().await[0].clicks.is_empty());
}

#[tokio::test]
async fn test_generic_failures_are_terminal() {
    let browser = ScriptedBrowser::new(
        ScriptedRun::accepting().fail(ScriptedAction::Navigate, BrowserError::Network("reset".into())),
    );
    let harness = Harness::new(browser).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .generic()
        .apply(request(task_id, "https://careers.example.com/apply/9", &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::TerminalFailure);
    assert_eq!(result.failure, Some(FailureKind::Network));
}

#[tokio::test]
async fn test_generic_submits_on_accepting_page() {
    let harness = Harness::new(ScriptedBrowser::accepting()).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .generic()
        .apply(request(task_id, "https://careers.example.com/apply/9", &profile), &trail)
        .await;

    assert!(result.is_success());
}

#[tokio::test]
async fn test_error_messages_are_scrubbed() {
    let browser = ScriptedBrowser::new(ScriptedRun::accepting().fail(
        ScriptedAction::Navigate,
        BrowserError::Navigation("redirected to login for ada@example.com".into()),
    ));
    let harness = Harness::new(browser).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .greenhouse()
        .apply(request(task_id, GREENHOUSE_URL, &profile), &trail)
        .await;

    let error = result.error.unwrap();
    assert!(!error.contains("ada@example.com"));
    assert!(error.contains("[EMAIL_REDACTED]"));

    let entries = harness.audit_repo.list_for_task(task_id).await.unwrap();
    let logged = serde_json::to_string(&entries.last().unwrap().payload).unwrap();
    assert!(!logged.contains("ada@example.com"));
}

#[tokio::test]
async fn test_launch_failure_is_classified() {
    let browser = ScriptedBrowser::new(
        ScriptedRun::accepting().fail(ScriptedAction::Launch, BrowserError::Session("no driver".into())),
    );
    let harness = Harness::new(browser).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;

    let result = harness
        .greenhouse()
        .apply(request(task_id, GREENHOUSE_URL, &profile), &trail)
        .await;

    assert_eq!(result.outcome, AgentOutcome::TransientFailure);
    assert!(result.artifact.is_none());
    assert_eq!(harness.browser.launches().await, 0);
}

#[tokio::test]
async fn test_panic_still_closes_session() {
    let browser = ScriptedBrowser::new(ScriptedRun::accepting().panic_on(ScriptedAction::Fill));
    let harness = Harness::new(browser).await;
    let profile = profile();
    let task_id = Uuid::new_v4();
    let trail = harness.trail(task_id).await;
    let agent = harness.greenhouse();

    let outcome = AssertUnwindSafe(agent.apply(request(task_id, GREENHOUSE_URL, &profile), &trail))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert!(harness.browser.sessions().await[0].closed);
}
