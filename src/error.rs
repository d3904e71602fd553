use thiserror::Error;

/// Failure taxonomy for material selection operations.
///
/// `NotFound` and `Validation` are raised before a transaction opens.
/// `Conflict`, `Unavailable` and `Store` imply the transaction rolled back,
/// so retrying the call is safe.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid {path}: {reason}")]
    Validation { path: String, reason: String },

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SelectionError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        SelectionError::NotFound(format!("{} '{}'", kind, id))
    }

    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SelectionError::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SelectionError::Conflict(_) | SelectionError::Unavailable(_)
        )
    }
}

pub type SelectionResult<T> = std::result::Result<T, SelectionError>;
