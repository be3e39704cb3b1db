//! Application services.

pub mod admission;
pub mod agent_registry;
pub mod audit_trail;
pub mod retry;
pub mod scheduler;
pub mod task_executor;
pub mod task_service;

pub use admission::{
    AdmissionRejected, AdmissionSettings, AdmissionSignal, AdmissionSlot, DomainAdmissionController,
};
pub use agent_registry::AgentRegistry;
pub use audit_trail::AuditTrail;
pub use retry::RetryPolicy;
pub use scheduler::{SchedulerSettings, TaskScheduler, TickReport};
pub use task_executor::{ExecutionReport, ExecutorPorts, TaskExecutor};
pub use task_service::TaskService;
