//! Greenhouse hosted application forms (`boards.greenhouse.io`).

use async_trait::async_trait;
use std::sync::Arc;

use super::form::{AgentSettings, FieldSpec, FormAgent, FormLayout, ProfileField};
use crate::domain::models::AgentResult;
use crate::domain::ports::{Agent, ApplyRequest, ArtifactStore, BrowserLauncher};
use crate::services::audit_trail::AuditTrail;

pub static GREENHOUSE_LAYOUT: FormLayout = FormLayout {
    fields: &[
        FieldSpec { field: ProfileField::FirstName, selector: "#first_name", required: true },
        FieldSpec { field: ProfileField::LastName, selector: "#last_name", required: true },
        FieldSpec { field: ProfileField::Email, selector: "#email", required: true },
        FieldSpec { field: ProfileField::Phone, selector: "#phone", required: false },
        FieldSpec {
            field: ProfileField::Location,
            selector: "#job_application_location",
            required: false,
        },
    ],
    resume_selector: Some("input[type=file]#resume"),
    resume_required: true,
    submit_selector: "#submit_app",
    success_selectors: &["#application_confirmation"],
    success_texts: &["Thank you for applying"],
};

pub struct GreenhouseAgent {
    form: FormAgent,
}

impl GreenhouseAgent {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            form: FormAgent::new(&GREENHOUSE_LAYOUT, launcher, artifacts, settings),
        }
    }
}

#[async_trait]
impl Agent for GreenhouseAgent {
    fn name(&self) -> &'static str {
        "greenhouse"
    }

    async fn apply(&self, request: ApplyRequest<'_>, audit: &AuditTrail) -> AgentResult {
        self.form.run(request, audit).await
    }
}
