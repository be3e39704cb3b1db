//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that adapters implement:
//! - TaskRepository / AuditRepository: task state and audit persistence
//! - JobCatalog / ProfileDirectory: read-only projections
//! - BrowserLauncher / BrowserSession: automation sessions
//! - Agent: the per-vendor `apply` capability
//! - Notifier / ArtifactStore: outbound events and diagnostics

pub mod agent;
pub mod artifact_store;
pub mod audit_repository;
pub mod browser;
pub mod catalog;
pub mod notifier;
pub mod task_repository;

pub use agent::{Agent, ApplyRequest};
pub use artifact_store::{ArtifactError, ArtifactStore};
pub use audit_repository::AuditRepository;
pub use browser::{BrowserError, BrowserLauncher, BrowserSession};
pub use catalog::{JobCatalog, ProfileDirectory};
pub use notifier::{NotifyError, Notifier};
pub use task_repository::{TaskFilter, TaskRepository};
