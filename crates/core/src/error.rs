//! Error types for the core domain.

use thiserror::Error;

use crate::cipher::CipherError;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown oauth provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
