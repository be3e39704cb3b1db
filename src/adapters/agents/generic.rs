//! Best-effort agent for vendors without a dedicated layout.
//!
//! Uses common attribute selectors. Anything that goes wrong is terminal:
//! retrying an unknown form will not make it known.

use async_trait::async_trait;
use std::sync::Arc;

use super::form::{AgentSettings, FieldSpec, FormAgent, FormLayout, ProfileField};
use crate::domain::models::AgentResult;
use crate::domain::ports::{Agent, ApplyRequest, ArtifactStore, BrowserLauncher};
use crate::services::audit_trail::AuditTrail;

pub static GENERIC_LAYOUT: FormLayout = FormLayout {
    fields: &[
        FieldSpec {
            field: ProfileField::FullName,
            selector: "input[name=name], input[name=full_name]",
            required: true,
        },
        FieldSpec { field: ProfileField::Email, selector: "input[type=email]", required: true },
        FieldSpec { field: ProfileField::Phone, selector: "input[type=tel]", required: false },
    ],
    resume_selector: Some("input[type=file]"),
    resume_required: false,
    submit_selector: "button[type=submit], input[type=submit]",
    success_selectors: &[],
    success_texts: &["Thank you", "Application submitted", "Application received"],
};

pub struct GenericAgent {
    form: FormAgent,
}

impl GenericAgent {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            form: FormAgent::new(&GENERIC_LAYOUT, launcher, artifacts, settings)
                .with_terminal_failures(),
        }
    }
}

#[async_trait]
impl Agent for GenericAgent {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn apply(&self, request: ApplyRequest<'_>, audit: &AuditTrail) -> AgentResult {
        self.form.run(request, audit).await
    }
}
