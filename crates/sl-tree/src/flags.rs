//! Node flags and the rules for combining them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tracing::{error, warn};

use crate::{FlagProblem, JsonNode, NodeType, Result, TreeError};

/// Flag bits stored on a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);

    /// The value lives in the schema node and is never read from a blob.
    pub const CONST: NodeFlags = NodeFlags(0x01);

    /// The array always has `len` elements and is stored without a length
    /// prefix.
    pub const FIXED_LENGTH: NodeFlags = NodeFlags(0x02);

    /// The node's array is a list of choices; blobs store an index into it.
    pub const ENUM: NodeFlags = NodeFlags(0x04);

    /// Every defined bit.
    pub const ALL: NodeFlags = NodeFlags(0x07);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Flags from raw bits, or `None` if an undefined bit is set.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(NodeFlags(bits))
        } else {
            None
        }
    }

    /// Flags from raw bits, keeping undefined bits.
    pub const fn from_bits_retain(bits: u8) -> Self {
        NodeFlags(bits)
    }

    pub const fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for NodeFlags {
    type Output = NodeFlags;

    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeFlags {
    fn bitor_assign(&mut self, rhs: NodeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::CONST) {
            set.entry(&"CONST");
        }
        if self.contains(Self::FIXED_LENGTH) {
            set.entry(&"FIXED_LENGTH");
        }
        if self.contains(Self::ENUM) {
            set.entry(&"ENUM");
        }
        let unknown = self.0 & !Self::ALL.0;
        if unknown != 0 {
            set.entry(&format_args!("{unknown:#04x}"));
        }
        set.finish()
    }
}

/// How [`set_flags`] treats non-fatal findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagPolicy {
    /// Log, correct, and succeed.
    #[default]
    Lenient,
    /// Log, correct, and return the first finding as an error.
    Strict,
}

/// Set the flags on a node whose value has already been set.
///
/// Fatal problems leave the node untouched: unknown bits, the enum flag on an
/// empty node, and the enum flag on anything but a primitive or string array.
/// Other conflicts are logged and corrected before the flags are applied
/// (const wins over fixed-length, enum wins over const).
pub fn set_flags(node: &mut JsonNode, flags: NodeFlags, policy: FlagPolicy) -> Result<()> {
    let unknown = flags.bits() & !NodeFlags::ALL.bits();
    if unknown != 0 {
        let err = TreeError::UnknownFlags {
            node: node.label(),
            bits: unknown,
        };
        error!(error = %err, "rejected node flags");
        return Err(err);
    }

    let mut flags = flags;
    let mut problems = Vec::new();

    if flags.contains(NodeFlags::CONST | NodeFlags::FIXED_LENGTH) {
        problems.push(FlagProblem::ConstAndFixedLength);
        flags.remove(NodeFlags::FIXED_LENGTH);
    }
    if flags.contains(NodeFlags::CONST | NodeFlags::ENUM) {
        problems.push(FlagProblem::ConstAndEnum);
        flags.remove(NodeFlags::CONST);
    }

    if flags.contains(NodeFlags::ENUM) {
        let fatal = if node.is_empty() {
            Some(TreeError::EnumOnEmptyArray { node: node.label() })
        } else if !node.node_type().is_value_array() {
            Some(TreeError::EnumOnWrongType {
                node: node.label(),
                node_type: node.node_type(),
            })
        } else {
            None
        };
        if let Some(err) = fatal {
            error!(error = %err, "rejected node flags");
            return Err(err);
        }
    }

    let node_type = node.node_type();
    if node_type == NodeType::Null || node_type.is_scalar() {
        if flags.contains(NodeFlags::FIXED_LENGTH) {
            problems.push(FlagProblem::FixedLengthOnScalar);
        }
    } else if node_type == NodeType::Object {
        if flags.contains(NodeFlags::CONST) {
            problems.push(FlagProblem::ConstOnObject);
        }
        if flags.contains(NodeFlags::FIXED_LENGTH) {
            problems.push(FlagProblem::FixedLengthOnObject);
        }
    } else if node_type == NodeType::ObjectArray && flags.contains(NodeFlags::CONST) {
        problems.push(FlagProblem::ConstOnObjectArray);
    }

    for problem in &problems {
        warn!(node = %node.label(), %problem, "corrected node flags");
    }
    node.flags = flags;

    match (policy, problems.first()) {
        (FlagPolicy::Strict, Some(&problem)) => Err(TreeError::FlagConflict {
            node: node.label(),
            problem,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeValue;

    fn node(value: NodeValue) -> JsonNode {
        JsonNode {
            name: Some("field".into()),
            value,
            ..JsonNode::default()
        }
    }

    fn int_array() -> JsonNode {
        node(NodeValue::Int32Array(vec![1, 2, 3].into_boxed_slice()))
    }

    #[test]
    fn from_bits_rejects_unknown() {
        assert_eq!(NodeFlags::from_bits(0x05), Some(NodeFlags::CONST | NodeFlags::ENUM));
        assert_eq!(NodeFlags::from_bits(0x08), None);
    }

    #[test]
    fn unknown_bits_are_fatal() {
        let mut n = int_array();
        let err = set_flags(&mut n, NodeFlags::from_bits_retain(0x10), FlagPolicy::Lenient)
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::UnknownFlags {
                node: "field".into(),
                bits: 0x10
            }
        );
        assert!(n.flags().is_empty());
    }

    #[test]
    fn enum_on_array_is_accepted() {
        let mut n = int_array();
        set_flags(&mut n, NodeFlags::ENUM, FlagPolicy::Strict).unwrap();
        assert!(n.is_enum());
    }

    #[test]
    fn enum_on_empty_array_is_fatal() {
        let mut n = node(NodeValue::Int32Array(Vec::new().into_boxed_slice()));
        let err = set_flags(&mut n, NodeFlags::ENUM, FlagPolicy::Lenient).unwrap_err();
        assert!(matches!(err, TreeError::EnumOnEmptyArray { .. }));
        assert!(err.is_fatal());
        assert!(!n.is_enum());
    }

    #[test]
    fn enum_on_string_or_object_array_is_fatal() {
        let mut s = node(NodeValue::String(b"abc\0".to_vec().into_boxed_slice()));
        assert!(matches!(
            set_flags(&mut s, NodeFlags::ENUM, FlagPolicy::Lenient),
            Err(TreeError::EnumOnWrongType {
                node_type: NodeType::String,
                ..
            })
        ));

        let mut oa = node(NodeValue::ObjectArray(vec![JsonNode::default()].into_boxed_slice()));
        assert!(set_flags(&mut oa, NodeFlags::ENUM, FlagPolicy::Lenient).is_err());
    }

    #[test]
    fn const_with_enum_drops_const() {
        let mut n = int_array();
        set_flags(&mut n, NodeFlags::CONST | NodeFlags::ENUM, FlagPolicy::Lenient).unwrap();
        assert_eq!(n.flags(), NodeFlags::ENUM);

        let mut strict = int_array();
        let err = set_flags(&mut strict, NodeFlags::CONST | NodeFlags::ENUM, FlagPolicy::Strict)
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::FlagConflict {
                node: "field".into(),
                problem: FlagProblem::ConstAndEnum
            }
        );
        assert!(!err.is_fatal());
        assert_eq!(strict.flags(), NodeFlags::ENUM);
    }

    #[test]
    fn const_with_fixed_length_drops_fixed_length() {
        let mut n = int_array();
        set_flags(
            &mut n,
            NodeFlags::CONST | NodeFlags::FIXED_LENGTH,
            FlagPolicy::Lenient,
        )
        .unwrap();
        assert_eq!(n.flags(), NodeFlags::CONST);
    }

    #[test]
    fn fixed_length_on_scalar_is_kept_but_reported() {
        let mut n = node(NodeValue::Int32(4));
        set_flags(&mut n, NodeFlags::FIXED_LENGTH, FlagPolicy::Lenient).unwrap();
        assert!(n.is_fixed_length());

        let mut strict = node(NodeValue::Int32(4));
        assert!(matches!(
            set_flags(&mut strict, NodeFlags::FIXED_LENGTH, FlagPolicy::Strict),
            Err(TreeError::FlagConflict {
                problem: FlagProblem::FixedLengthOnScalar,
                ..
            })
        ));
    }

    #[test]
    fn const_on_object_is_reported() {
        let mut n = node(NodeValue::Object(Vec::new().into_boxed_slice()));
        assert!(matches!(
            set_flags(&mut n, NodeFlags::CONST, FlagPolicy::Strict),
            Err(TreeError::FlagConflict {
                problem: FlagProblem::ConstOnObject,
                ..
            })
        ));
    }
}
