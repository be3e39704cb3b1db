//! Browser automation port.
//!
//! A launcher hands out isolated sessions; agents drive a session with CSS
//! selectors and never see the underlying protocol.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::FailureKind;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrowserError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("HTTP {status} from destination")]
    Http { status: u16 },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Fixed mapping from browser errors to failure kinds.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Navigation(_) | Self::Network(_) | Self::Session(_) => FailureKind::Network,
            Self::ElementNotFound(_) => FailureKind::RequiredFieldMissing,
            Self::StaleElement(_) | Self::NotInteractable(_) => FailureKind::DetachedElement,
            Self::Http { status: 403 | 429 } => FailureKind::Forbidden,
            Self::Http { status } if *status >= 500 => FailureKind::Network,
            Self::Http { .. } => FailureKind::IncompatibleLayout,
            Self::Protocol(_) => FailureKind::Internal,
        }
    }
}

/// One isolated, cookie-free automation session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Rendered page source
    async fn page_source(&self) -> Result<String, BrowserError>;

    /// Whether an element matching `selector` is present
    async fn exists(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Clear a field and type `value` into it
    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;

    /// Attach a local file to a file input
    async fn upload(&self, selector: &str, path: &str) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    /// Tear the session down. Called exactly once per session.
    async fn close(&self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
