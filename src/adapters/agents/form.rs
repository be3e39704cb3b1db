//! Form-filling protocol shared by every vendor agent.
//!
//! A vendor is described by a static [`FormLayout`]; [`FormAgent`] runs the
//! fixed sequence against it: launch, navigate, probe for CAPTCHA, fill,
//! attach resume, submit, wait for confirmation. The session is closed on
//! every exit path, including a panic inside the run.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::captcha::{find_captcha_indicator, is_access_denied};
use crate::domain::models::{AgentResult, AuditPayload, AuditStep, BrowserConfig, CandidateProfile};
use crate::domain::ports::{ApplyRequest, ArtifactStore, BrowserError, BrowserLauncher, BrowserSession};
use crate::infrastructure::logging::PiiScrubber;
use crate::services::audit_trail::AuditTrail;

/// Timing knobs for the confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub submit_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&BrowserConfig::default())
    }
}

impl AgentSettings {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            submit_timeout: Duration::from_millis(config.submit_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Profile value a form field is filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    FirstName,
    LastName,
    FullName,
    Email,
    Phone,
    Location,
}

impl ProfileField {
    /// Name written to the audit trail in place of the value.
    pub fn key(&self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::FullName => "full_name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Location => "location",
        }
    }

    pub fn value<'p>(&self, profile: &'p CandidateProfile) -> Option<&'p str> {
        let value = match self {
            Self::FirstName => profile.split_name().0,
            Self::LastName => profile.split_name().1,
            Self::FullName => Some(profile.full_name.trim()),
            Self::Email => profile.email.as_deref(),
            Self::Phone => profile.phone.as_deref(),
            Self::Location => profile.location.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: ProfileField,
    pub selector: &'static str,
    /// A required field missing from the page is a layout mismatch
    pub required: bool,
}

/// Selectors for one vendor's application form.
#[derive(Debug)]
pub struct FormLayout {
    pub fields: &'static [FieldSpec],
    pub resume_selector: Option<&'static str>,
    pub resume_required: bool,
    pub submit_selector: &'static str,
    pub success_selectors: &'static [&'static str],
    /// Matched case-insensitively against the page source
    pub success_texts: &'static [&'static str],
}

enum RunOutcome {
    Submitted,
    Captcha(&'static str),
}

pub struct FormAgent {
    layout: &'static FormLayout,
    launcher: Arc<dyn BrowserLauncher>,
    artifacts: Arc<dyn ArtifactStore>,
    settings: AgentSettings,
    scrubber: PiiScrubber,
    terminal_failures: bool,
}

impl FormAgent {
    pub fn new(
        layout: &'static FormLayout,
        launcher: Arc<dyn BrowserLauncher>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            layout,
            launcher,
            artifacts,
            settings,
            scrubber: PiiScrubber::new(),
            terminal_failures: false,
        }
    }

    /// Classify every failure as terminal.
    pub fn with_terminal_failures(mut self) -> Self {
        self.terminal_failures = true;
        self
    }

    pub fn layout(&self) -> &'static FormLayout {
        self.layout
    }

    pub async fn run(&self, request: ApplyRequest<'_>, audit: &AuditTrail) -> AgentResult {
        let session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(err) => return self.failed(None, request.task_id, audit, &err).await,
        };

        let run = AssertUnwindSafe(self.drive(session.as_ref(), request, audit))
            .catch_unwind()
            .await;

        let result = match run {
            Ok(Ok(RunOutcome::Submitted)) => AgentResult::submitted(),
            Ok(Ok(RunOutcome::Captcha(indicator))) => {
                let screenshot = self.capture(session.as_ref(), request.task_id, "captcha").await;
                audit
                    .note(
                        AuditStep::CaptchaDetected,
                        AuditPayload::new()
                            .with("indicator", indicator)
                            .with_opt("screenshot", screenshot.clone()),
                    )
                    .await;
                AgentResult::captcha(indicator).with_artifact(screenshot)
            }
            Ok(Err(err)) => self.failed(Some(session.as_ref()), request.task_id, audit, &err).await,
            Err(panic) => {
                close(session.as_ref()).await;
                std::panic::resume_unwind(panic);
            }
        };

        close(session.as_ref()).await;
        result
    }

    async fn drive(
        &self,
        session: &dyn BrowserSession,
        request: ApplyRequest<'_>,
        audit: &AuditTrail,
    ) -> Result<RunOutcome, BrowserError> {
        session.navigate(request.apply_url).await?;
        audit
            .note(AuditStep::Navigate, AuditPayload::new().with("url", request.apply_url))
            .await;

        let page = session.page_source().await?;
        if let Some(indicator) = find_captcha_indicator(&page) {
            return Ok(RunOutcome::Captcha(indicator));
        }
        if is_access_denied(&page) {
            return Err(BrowserError::Http { status: 403 });
        }

        self.fill_fields(session, request.profile, audit).await?;
        self.attach_resume(session, request.resume, audit).await?;

        session.click(self.layout.submit_selector).await?;
        self.await_confirmation(session).await?;

        audit
            .note(AuditStep::Submit, AuditPayload::new().with("result", "success"))
            .await;
        Ok(RunOutcome::Submitted)
    }

    async fn fill_fields(
        &self,
        session: &dyn BrowserSession,
        profile: &CandidateProfile,
        audit: &AuditTrail,
    ) -> Result<(), BrowserError> {
        let mut filled = Vec::new();
        let mut skipped = Vec::new();

        for input in self.layout.fields {
            let Some(value) = input.field.value(profile) else {
                skipped.push(input.field.key());
                continue;
            };
            if !input.required && !session.exists(input.selector).await? {
                skipped.push(input.field.key());
                continue;
            }
            session.fill(input.selector, value).await?;
            filled.push(input.field.key());
        }

        audit
            .note(
                AuditStep::FillPersonalInfo,
                AuditPayload::new().with("fields", filled).with("skipped", skipped),
            )
            .await;
        Ok(())
    }

    async fn attach_resume(
        &self,
        session: &dyn BrowserSession,
        resume: Option<&str>,
        audit: &AuditTrail,
    ) -> Result<(), BrowserError> {
        let Some(selector) = self.layout.resume_selector else {
            return Ok(());
        };

        let Some(path) = resume else {
            if self.layout.resume_required {
                return Err(BrowserError::ElementNotFound(
                    "resume required but the profile has none".to_string(),
                ));
            }
            audit
                .note(
                    AuditStep::UploadResume,
                    AuditPayload::new().with("attached", false).with("reason", "no_resume"),
                )
                .await;
            return Ok(());
        };

        if !self.layout.resume_required && !session.exists(selector).await? {
            audit
                .note(
                    AuditStep::UploadResume,
                    AuditPayload::new().with("attached", false).with("reason", "no_input"),
                )
                .await;
            return Ok(());
        }

        session.upload(selector, path).await?;
        audit
            .note(AuditStep::UploadResume, AuditPayload::new().with("attached", true))
            .await;
        Ok(())
    }

    async fn await_confirmation(&self, session: &dyn BrowserSession) -> Result<(), BrowserError> {
        let deadline = Instant::now() + self.settings.submit_timeout;
        loop {
            if self.confirmed(session).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "no submission confirmation within {:?}",
                    self.settings.submit_timeout
                )));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn confirmed(&self, session: &dyn BrowserSession) -> Result<bool, BrowserError> {
        for selector in self.layout.success_selectors {
            if session.exists(selector).await? {
                return Ok(true);
            }
        }
        if self.layout.success_texts.is_empty() {
            return Ok(false);
        }
        let page = session.page_source().await?.to_lowercase();
        Ok(self
            .layout
            .success_texts
            .iter()
            .any(|text| page.contains(&text.to_lowercase())))
    }

    async fn failed(
        &self,
        session: Option<&dyn BrowserSession>,
        task_id: Uuid,
        audit: &AuditTrail,
        err: &BrowserError,
    ) -> AgentResult {
        let kind = err.failure_kind();
        let message = self.scrubber.scrub(&err.to_string());

        let screenshot = match session {
            Some(session) => self.capture(session, task_id, "error").await,
            None => None,
        };

        audit
            .note(
                AuditStep::Error,
                AuditPayload::new()
                    .with("message", message.clone())
                    .with("failure", kind.as_str())
                    .with_opt("screenshot", screenshot.clone()),
            )
            .await;

        let result = if self.terminal_failures {
            AgentResult::terminal(kind, message)
        } else {
            AgentResult::failure(kind, message)
        };
        result.with_artifact(screenshot)
    }

    /// Best-effort screenshot; failures never change the outcome.
    async fn capture(&self, session: &dyn BrowserSession, task_id: Uuid, label: &str) -> Option<String> {
        let bytes = match session.screenshot().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "screenshot failed");
                return None;
            }
        };
        match self.artifacts.store(task_id, label, &bytes).await {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "failed to store screenshot");
                None
            }
        }
    }
}

async fn close(session: &dyn BrowserSession) {
    match session.close().await {
        Ok(()) => debug!("browser session closed"),
        Err(err) => warn!(error = %err, "failed to close browser session"),
    }
}
