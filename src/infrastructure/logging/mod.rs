//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output
//! - Rolling JSON log files
//! - PII scrubbing for free-text error messages

pub mod logger;
pub mod pii_scrubbing;

pub use logger::{LogFormat, LoggerImpl, RotationPolicy};
pub use pii_scrubbing::PiiScrubber;
