//! Session error taxonomy.

use std::fmt;

use engage_core::TransportError;
use serde::{Deserialize, Serialize};

use crate::SessionStatus;

/// Initialization step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStage {
    IssueToken,
    OpenSession,
    BindIdentity,
    /// The attempt's task panicked or was aborted.
    Aborted,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IssueToken => "token issuance",
            Self::OpenSession => "session open",
            Self::BindIdentity => "identity binding",
            Self::Aborted => "initialization task",
        })
    }
}

/// Captured failure of an initialization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub stage: InitStage,
    pub message: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(stage: InitStage, error: impl fmt::Display) -> Self {
        Self {
            stage,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

/// Session error.
///
/// `Clone` so that every caller joining one initialization receives the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Token issuance, session open or identity binding failed.
    #[error("Authentication failed: {0}")]
    Auth(ErrorInfo),
    /// Operation attempted before the session reached `Ready`.
    #[error("Session not ready (status: {0:?})")]
    NotReady(SessionStatus),
    /// Outbound send failed on a ready session.
    #[error("Delivery failed: {0}")]
    Delivery(#[source] TransportError),
    /// Fetch or sync failed.
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SessionError {
    /// Whether the caller may reasonably retry the same operation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Delivery(_) | Self::Transport(_))
    }
}
