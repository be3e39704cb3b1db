//! autoapply - rate-limited, audited job application automation
//!
//! autoapply drives candidate applications through third-party applicant
//! tracking system forms (Greenhouse, Lever and a generic fallback). Every
//! application is a persisted task moved through an explicit state machine,
//! every host is guarded by admission control, and every attempt leaves an
//! append-only audit trail.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): task state machine, projections and ports
//! - **Service Layer** (`services`): admission, retry, executor and scheduler
//! - **Adapters** (`adapters`): SQLite, WebDriver, vendor agents, notifiers
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    ApplicationTask, AuditLogEntry, AuditStep, CandidateProfile, Config, Job, JobSource,
    TaskStatus,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{DomainAdmissionController, TaskExecutor, TaskScheduler, TaskService};
