pub mod agent_result;
pub mod audit;
pub mod config;
pub mod domain_policy;
pub mod events;
pub mod job;
pub mod task;

pub use agent_result::{AgentOutcome, AgentResult, FailureKind};
pub use audit::{AuditLogEntry, AuditPayload, AuditStep};
pub use config::{
    AdmissionConfig, AdmissionMode, ArtifactConfig, BrowserConfig, Config, DatabaseConfig,
    DomainPolicyConfig, LoggingConfig, NotificationConfig, RetryConfig, SchedulerConfig,
};
pub use domain_policy::{Domain, DomainStatus, RateLimitPolicy};
pub use events::CompletionEvent;
pub use job::{host_of, CandidateProfile, Job, JobSource};
pub use task::{ApplicationTask, TaskStatus};
