//! Infrastructure adapters for external systems.

pub mod agents;
pub mod artifacts;
pub mod browser;
pub mod notifications;
pub mod sqlite;
