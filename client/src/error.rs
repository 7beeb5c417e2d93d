//! Failures that can cross the snapshot and action boundaries.

use shared::ServerId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The backend could not be reached or answered with something unusable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The payload arrived but failed validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    /// The action targeted a server the backend no longer knows.
    #[error("server {uuid} not found")]
    NotFound { uuid: ServerId, reason: String },

    /// The backend refused the action and said why.
    #[error("{0}")]
    Rejected(String),
}

impl SyncError {
    /// Transport-class failures are retried by the next poll and stay quiet while polling.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::InvalidPayload(_))
    }

    pub fn not_found(uuid: impl Into<ServerId>) -> Self {
        SyncError::NotFound {
            uuid: uuid.into(),
            reason: String::new(),
        }
    }

    /// Text shown to the operator when an action fails.
    pub fn reason(&self) -> String {
        match self {
            SyncError::Rejected(reason)
            | SyncError::Authorization(reason)
            | SyncError::NotFound { reason, .. }
                if !reason.trim().is_empty() =>
            {
                reason.clone()
            }
            SyncError::Rejected(_) | SyncError::Authorization(_) => {
                GENERIC_FAILURE.to_string()
            }
            other => other.to_string(),
        }
    }
}

pub const GENERIC_FAILURE: &str = "Action failed";

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::InvalidPayload(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}
