//! CLI command implementations.

pub mod config;
pub mod domain;
pub mod init;
pub mod job;
pub mod profile;
pub mod task;
pub mod worker;
