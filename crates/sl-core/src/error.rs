//! Error types for transcoding and the sltool CLI.

use sl_blob::BlobError;
use sl_json::SerializeError;
use sl_tree::TreeError;
use thiserror::Error;

/// Result type alias for sl-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for sl-core.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    // Schema errors (20-29)
    #[error("invalid schema: {0}")]
    Schema(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    // Data errors (30-39)
    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("enum value is out of range {{value = {index}, max = {len}}} in '{node}'")]
    EnumOutOfRange { node: String, index: u16, len: u16 },

    #[error("object array '{node}' has no element schema for {count} stored elements")]
    MissingElementSchema { node: String, count: u16 },

    #[error("cannot encode '{node}': {reason}")]
    Encode { node: String, reason: String },

    // Output errors (40-49)
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::Logging(_) => 11,
            Error::Schema(_) => 20,
            Error::Tree(_) => 21,
            Error::Blob(_) => 30,
            Error::EnumOutOfRange { .. } => 31,
            Error::MissingElementSchema { .. } => 32,
            Error::Encode { .. } => 33,
            Error::Serialize(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    pub(crate) fn encode(node: &str, reason: impl Into<String>) -> Self {
        Error::Encode {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}
