//! Agent port - the `apply` capability every ATS vendor routine implements.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{AgentResult, CandidateProfile};
use crate::services::audit_trail::AuditTrail;

/// Everything an agent needs for one run.
#[derive(Debug, Clone, Copy)]
pub struct ApplyRequest<'a> {
    pub task_id: Uuid,
    pub apply_url: &'a str,
    pub profile: &'a CandidateProfile,
    pub resume: Option<&'a str>,
}

/// A vendor-specific automation routine.
///
/// Implementations never return errors: every exit path is a classified
/// [`AgentResult`].
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, request: ApplyRequest<'_>, audit: &AuditTrail) -> AgentResult;
}
