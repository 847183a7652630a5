//! Error types for blob operations.

use thiserror::Error;

/// Errors produced while measuring, writing, or reading a blob.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// The writer ran past the end of its buffer.
    #[error("hit end of buffer while writing (tried to write {requested} bytes, with {available} available)")]
    WriteOverrun { requested: usize, available: usize },

    /// The reader ran past the end of the blob.
    #[error("hit end of buffer while reading (tried to read {requested} bytes, with {available} available)")]
    ReadOverrun { requested: usize, available: usize },

    /// A caller supplied output slice cannot hold the stored array.
    #[error("buffer is too small to read the data (length = {capacity}, needed = {needed})")]
    BufferTooSmall { capacity: usize, needed: usize },

    /// More values were supplied than the fixed length declared by the schema.
    #[error("{actual} values do not fit in a fixed length array of {fixed}")]
    FixedLengthExceeded { actual: usize, fixed: u16 },

    /// A precomputed string length disagrees with the string it describes.
    #[error("string {index} has {available} bytes but a declared length of {declared}")]
    LengthMismatch {
        index: usize,
        available: usize,
        declared: u16,
    },

    /// The string and length arrays passed together have different sizes.
    #[error("{strings} strings were passed with {lengths} lengths")]
    CountMismatch { strings: usize, lengths: usize },
}

/// Result type alias for blob operations.
pub type Result<T> = std::result::Result<T, BlobError>;
