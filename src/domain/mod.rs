//! Domain layer for the autoapply application pipeline
//!
//! This module contains the task state machine, the read-only job and
//! candidate projections, audit records, and the port traits adapters
//! implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
