//! Error types for swstore

use std::io;

/// Result type alias for swstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache storage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bucket file or record could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Response body or header exceeds the record limits
    #[error("Value too large: {0} bytes")]
    ValueTooLarge(usize),

    /// Bucket name contains characters that cannot be used as a file name
    #[error("Invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// Bucket does not exist in storage
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket was deleted or closed
    #[error("Bucket is closed")]
    Closed,
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        let detail = match err {
            nom::Err::Incomplete(needed) => format!("incomplete record ({:?})", needed),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                format!("{:?} at {} remaining bytes", e.code, e.input.len())
            }
        };
        Error::Parse(detail)
    }
}
