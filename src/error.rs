use thiserror::Error;

/// Operator-visible failure kinds.
///
/// Store and transport failures are folded into `Unavailable`; nothing
/// lower-level crosses a component boundary.
#[derive(Error, Debug)]
pub enum FraudError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl FraudError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        FraudError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FraudError::NotFound { .. } => "NOT_FOUND",
            FraudError::InvalidState(_) => "INVALID_STATE",
            FraudError::InvalidArgument(_) => "INVALID_ARGUMENT",
            FraudError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FraudError::Unavailable(_))
    }
}

impl From<anyhow::Error> for FraudError {
    fn from(err: anyhow::Error) -> Self {
        FraudError::Unavailable(format!("{err:#}"))
    }
}

impl From<tokio::time::error::Elapsed> for FraudError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        FraudError::Unavailable("deadline exceeded".to_string())
    }
}

pub type FraudResult<T> = Result<T, FraudError>;
