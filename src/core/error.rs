use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Conflict: '{entity}' ({identity}) already holds a row valid from {valid_from}")]
    Conflict {
        entity: String,
        identity: String,
        valid_from: i64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl CascadeError {
    /// True for the recoverable class of errors: a snapshot colliding with
    /// an already stored row at the same identity and `valid_from`, or an
    /// insert that would give one identity a second active row. The stored
    /// row stays authoritative in that case.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::ConstraintViolation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CascadeError>;

impl<T> From<std::sync::PoisonError<T>> for CascadeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
