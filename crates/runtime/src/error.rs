use thiserror::Error;

use crate::catalog::CatalogError;
use crate::model::ModelError;
use crate::tools::ToolError;

/// Errors that end a conversation.
#[derive(Debug, Error)]
pub enum Error {
    /// The tool host could not be launched or did not complete the handshake.
    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Provider(#[from] ModelError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The model named a tool outside the catalog under the abort policy.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("model still requesting tools after {0} rounds")]
    RoundLimit(usize),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A host call made outside a conversation failed.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

pub type Result<T> = std::result::Result<T, Error>;
