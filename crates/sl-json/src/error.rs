//! Serializer errors.

use thiserror::Error;

use crate::Scope;

/// A call that would have produced malformed JSON.
///
/// Only returned by a validating serializer; a non-validating one writes
/// whatever it is told to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("attempted to write a key outside an object {{key name = '{key}', len = {len}}}")]
    KeyOutsideObject { key: String, len: usize },

    #[error("attempted to write out two key names in a row {{key name = '{key}', len = {len}}}")]
    DuplicateKey { key: String, len: usize },

    #[error("attempted to put multiple values into the global scope")]
    MultipleRootValues,

    #[error("attempted to write a value without a key inside an object")]
    MissingKey,

    #[error("attempted to close an object while its last key has no value")]
    DanglingKey,

    #[error("attempted to close an {0} that was never opened")]
    NotOpen(Scope),

    #[error("finished writing in the middle of an {0}")]
    Unfinished(Scope),
}

/// Result type alias for serializer calls.
pub type Result<T> = std::result::Result<T, SerializeError>;
