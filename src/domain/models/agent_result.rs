//! Agent run outcomes and their classification.

use serde::{Deserialize, Serialize};

/// Outcome tag of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOutcome {
    Submitted,
    CaptchaDetected,
    TransientFailure,
    TerminalFailure,
}

impl AgentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::CaptchaDetected => "captcha_detected",
            Self::TransientFailure => "transient_failure",
            Self::TerminalFailure => "terminal_failure",
        }
    }
}

impl std::fmt::Display for AgentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an agent run failed.
///
/// The outcome of a failure is a fixed function of its kind, so the retry
/// decision never depends on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Network,
    DetachedElement,
    /// HTTP 403-class refusal from the destination
    Forbidden,
    RequiredFieldMissing,
    IncompatibleLayout,
    UnsupportedSource,
    /// Bug inside an agent (panic)
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::DetachedElement => "detached_element",
            Self::Forbidden => "forbidden",
            Self::RequiredFieldMissing => "required_field_missing",
            Self::IncompatibleLayout => "incompatible_layout",
            Self::UnsupportedSource => "unsupported_source",
            Self::Internal => "internal",
        }
    }

    pub fn outcome(&self) -> AgentOutcome {
        match self {
            Self::Timeout
            | Self::Network
            | Self::DetachedElement
            | Self::Forbidden
            | Self::Internal => AgentOutcome::TransientFailure,
            Self::RequiredFieldMissing | Self::IncompatibleLayout | Self::UnsupportedSource => {
                AgentOutcome::TerminalFailure
            }
        }
    }
}

/// Result of one agent run. Not persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub outcome: AgentOutcome,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    /// Reference to a diagnostic screenshot
    pub artifact: Option<String>,
}

impl AgentResult {
    pub fn submitted() -> Self {
        Self {
            outcome: AgentOutcome::Submitted,
            error: None,
            failure: None,
            artifact: None,
        }
    }

    pub fn captcha(indicator: &str) -> Self {
        Self {
            outcome: AgentOutcome::CaptchaDetected,
            error: Some(format!("captcha indicator found: {indicator}")),
            failure: None,
            artifact: None,
        }
    }

    /// A failure classified by its kind.
    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            outcome: kind.outcome(),
            error: Some(error.into()),
            failure: Some(kind),
            artifact: None,
        }
    }

    /// A failure forced to be terminal regardless of its kind.
    pub fn terminal(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            outcome: AgentOutcome::TerminalFailure,
            ..Self::failure(kind, error)
        }
    }

    pub fn with_artifact(mut self, artifact: Option<String>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AgentOutcome::Submitted
    }
}
