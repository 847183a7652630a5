//! Exit codes for the sltool CLI.
//!
//! Scripts can tell a bad schema from a bad blob without parsing stderr.

use sl_tree::TreeError;

use crate::Error;

/// Exit codes for sltool operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed
    Clean = 0,

    /// Configuration or logging setup error
    ConfigError = 10,

    /// Schema could not be parsed or built
    SchemaError = 11,

    /// Blob, event data, or node image is malformed
    DataError = 12,

    /// I/O error
    IoError = 13,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) | Error::Logging(_) => ExitCode::ConfigError,
            Error::Tree(TreeError::InvalidImage(_)) => ExitCode::DataError,
            Error::Schema(_) | Error::Tree(_) => ExitCode::SchemaError,
            Error::Blob(_)
            | Error::EnumOutOfRange { .. }
            | Error::MissingElementSchema { .. }
            | Error::Encode { .. }
            | Error::Json(_) => ExitCode::DataError,
            Error::Io(_) => ExitCode::IoError,
            Error::Serialize(_) => ExitCode::InternalError,
        }
    }
}
