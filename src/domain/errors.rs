//! Error taxonomy for the engram core.

use thiserror::Error;

/// Core errors surfaced by the repository, pipeline, and orchestrators.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed at {path}: {message}")]
    Validation { path: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("precondition unmet: {0}")]
    State(String),

    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    #[error("external failure: {0}")]
    External(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Taxonomy tag for the JSON error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::NotFound { .. } => "NotFound",
            Self::State(_) => "StateError",
            Self::Conflict(_) => "ConflictError",
            Self::External(_) => "ExternalError",
            Self::InvalidInput(_) => "InvalidInput",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(db.to_string())
            }
            _ => CoreError::External(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::External(format!("json: {err}"))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::External(format!("io: {err}"))
    }
}
