//! Self-describing node trees for structured log events.
//!
//! A [`JsonNode`] tree describes the layout of an event: every node has a
//! type, optional name and flags, and either an inline scalar, an owned
//! array, or owned child nodes. Trees double as schemas for decoding event
//! blobs and as plain value trees.
//!
//! Trees are built in two phases. A [`JsonTreeSizeCalculator`] first measures
//! the memory a tree will need; a [`JsonBuilder`] then creates the nodes while
//! charging each allocation to an [`Allocator`]. With a [`BlockAllocator`]
//! sized from the measurement, construction either fits exactly or fails.
//!
//! The [`layout`] module lays a tree out in the fixed 24-byte node format
//! used to share schemas across module boundaries.

pub mod alloc;
pub mod builder;
pub mod compare;
pub mod error;
pub mod flags;
pub mod layout;
pub mod node;
pub mod size;
pub mod temp;

pub use alloc::{fixup_alignment, AllocError, Allocator, BlockAllocator, HeapAllocator, ALIGNMENT};
pub use builder::{clear_json_tree, Binary, JsonBuilder, NodeData};
pub use compare::{compare_json_trees, CompareFuzz};
pub use error::{FlagProblem, Result, TreeError};
pub use flags::{set_flags, FlagPolicy, NodeFlags};
pub use layout::{read_image, write_image, RawJsonNode};
pub use node::{EnumBase, JsonNode, NodeType, NodeValue, NODE_SIZE, POINTER_SIZE};
pub use size::JsonTreeSizeCalculator;
pub use temp::TempJsonNode;
