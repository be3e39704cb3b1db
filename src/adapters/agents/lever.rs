//! Lever hosted application forms (`jobs.lever.co`).

use async_trait::async_trait;
use std::sync::Arc;

use super::form::{AgentSettings, FieldSpec, FormAgent, FormLayout, ProfileField};
use crate::domain::models::AgentResult;
use crate::domain::ports::{Agent, ApplyRequest, ArtifactStore, BrowserLauncher};
use crate::services::audit_trail::AuditTrail;

// Lever takes the full name in a single input.
pub static LEVER_LAYOUT: FormLayout = FormLayout {
    fields: &[
        FieldSpec { field: ProfileField::FullName, selector: "input[name=name]", required: true },
        FieldSpec { field: ProfileField::Email, selector: "input[name=email]", required: true },
        FieldSpec { field: ProfileField::Phone, selector: "input[name=phone]", required: false },
        FieldSpec {
            field: ProfileField::Location,
            selector: "input[name=location]",
            required: false,
        },
    ],
    resume_selector: Some("input[name=resume]"),
    resume_required: true,
    submit_selector: "button[type=submit]",
    success_selectors: &["[data-qa=msg-submit-success]"],
    success_texts: &["Application submitted"],
};

pub struct LeverAgent {
    form: FormAgent,
}

impl LeverAgent {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            form: FormAgent::new(&LEVER_LAYOUT, launcher, artifacts, settings),
        }
    }
}

#[async_trait]
impl Agent for LeverAgent {
    fn name(&self) -> &'static str {
        "lever"
    }

    async fn apply(&self, request: ApplyRequest<'_>, audit: &AuditTrail) -> AgentResult {
        self.form.run(request, audit).await
    }
}
