use thiserror::Error;

use crate::backend::BackendError;

/// Result type for classmaker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while building or emitting a class
#[derive(Error, Debug)]
pub enum Error {
    /// No legal conversion, wrong arity, illegal flag combination, misplaced annotation.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Statement added to a block that is not the innermost active one, or reuse of a
    /// builder that has already been finished.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState { .. })
    }
}
