//! Error taxonomy shared across the crate.

use thiserror::Error;

/// Errors surfaced by training, prediction, merging and (de)serialization.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input: zero trees, mismatched lengths, a split
    /// rule that does not apply to the tree family, and so on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A key or column index beyond the bounds of the data it addresses.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A numeric precondition violated by otherwise well-formed input.
    #[error("domain error: {0}")]
    DomainError(String),

    /// Unknown family tag, truncated stream or version mismatch in a
    /// forest archive.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The user-interrupt predicate fired while trees were being grown.
    #[error("interrupted")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid<S: Into<String>>(message: S) -> Error {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn domain<S: Into<String>>(message: S) -> Error {
        Error::DomainError(message.into())
    }
}
