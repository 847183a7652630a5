//! Error types for tree construction.

use std::fmt;

use thiserror::Error;

use crate::NodeType;

/// Result type alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors raised while building, flagging, or decoding a node tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The allocator refused a request. The tree under construction must be
    /// cleared and discarded.
    #[error("allocator ran out of memory (node = '{node}', requested {requested} bytes)")]
    OutOfMemory { node: String, requested: usize },

    #[error("string length exceeds 64KiB maximum (node = '{node}', {len} bytes)")]
    StringTooLong { node: String, len: usize },

    #[error("array of {len} elements exceeds the 65535 element limit (node = '{node}')")]
    ArrayTooLong { node: String, len: usize },

    /// Node creation requires an empty node.
    #[error("node '{node}' already holds a {node_type:?} value")]
    NodeNotEmpty { node: String, node_type: NodeType },

    // Fatal flag errors: the flags are not applied.
    #[error("unknown flags were used {bits:02x} (node = '{node}')")]
    UnknownFlags { node: String, bits: u8 },

    #[error("an empty array can not be made into an enum (node = '{node}')")]
    EnumOnEmptyArray { node: String },

    #[error("an enum type must be on a non-object array type (node = '{node}', type = {node_type:?})")]
    EnumOnWrongType { node: String, node_type: NodeType },

    /// A non-fatal flag finding, only returned under [`FlagPolicy::Strict`].
    /// The corrected flags have already been applied.
    ///
    /// [`FlagPolicy::Strict`]: crate::FlagPolicy::Strict
    #[error("{problem} (node = '{node}')")]
    FlagConflict { node: String, problem: FlagProblem },

    #[error("invalid node image: {0}")]
    InvalidImage(String),
}

impl TreeError {
    /// Whether the error leaves the node untouched (fatal) rather than
    /// describing a corrected, applied state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TreeError::FlagConflict { .. })
    }
}

/// Non-fatal flag combinations that `set_flags` corrects or tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagProblem {
    /// Fixed-length is dropped.
    ConstAndFixedLength,
    /// Const is dropped.
    ConstAndEnum,
    FixedLengthOnScalar,
    ConstOnObject,
    FixedLengthOnObject,
    ConstOnObjectArray,
}

impl fmt::Display for FlagProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FlagProblem::ConstAndFixedLength => {
                "attempted to set node to be both const and fixed length"
            }
            FlagProblem::ConstAndEnum => "a node cannot be both constant and an enum",
            FlagProblem::FixedLengthOnScalar => "fixed length cannot be set on a scalar node",
            FlagProblem::ConstOnObject => "const is meaningless on an object node",
            FlagProblem::FixedLengthOnObject => "fixed length is meaningless on an object node",
            FlagProblem::ConstOnObjectArray => "const is meaningless on an object array",
        };
        f.write_str(text)
    }
}
