//! Error types for Sleep League

use thiserror::Error;

/// Failures reported by a repository backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage timed out: {0}")]
    Timeout(String),

    #[error("Document missing: {0}")]
    Missing(String),
}

/// Errors returned by league operations
#[derive(Debug, Error)]
pub enum LeagueError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A state transition that the current state does not allow
    #[error("{0}")]
    Conflict(String),

    /// Unmet eligibility criterion, worded for the end user
    #[error("{0}")]
    Ineligible(String),

    #[error("Storage failure: {0}")]
    Storage(StoreError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl LeagueError {
    /// Whether the caller may safely retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeagueError::Storage(_))
    }
}

impl From<StoreError> for LeagueError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Missing(what) => LeagueError::NotFound(what),
            other => LeagueError::Storage(other),
        }
    }
}

impl From<crate::schema::ValidationError> for LeagueError {
    fn from(e: crate::schema::ValidationError) -> Self {
        LeagueError::Validation(e.to_string())
    }
}
