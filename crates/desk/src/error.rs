use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input failed a field rule (bad priority, malformed email, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A business rule rejected an otherwise well-formed request.
    #[error("{0}")]
    Domain(String),
}

pub type Result<T> = std::result::Result<T, Error>;
