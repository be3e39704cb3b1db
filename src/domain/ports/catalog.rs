//! Read-only lookups owned by other services.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CandidateProfile, Job};

#[async_trait]
pub trait JobCatalog: Send + Sync {
    async fn get_job(&self, id: Uuid) -> DomainResult<Option<Job>>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> DomainResult<Option<CandidateProfile>>;
}
