//! The node model.

use crate::NodeFlags;

/// Size of one node in the fixed 24-byte node layout.
pub const NODE_SIZE: usize = 24;

/// Size of a pointer slot in the node layout (64-bit targets).
pub const POINTER_SIZE: usize = 8;

/// Integer type that stores an index into an enum node's choice array.
pub type EnumBase = u16;

/// Type tag of a [`JsonNode`].
///
/// The discriminants are part of the node layout and must not be reordered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeType {
    #[default]
    Null = 0,
    Bool = 1,
    BoolArray = 2,
    Int32 = 3,
    Int32Array = 4,
    Uint32 = 5,
    Uint32Array = 6,
    Int64 = 7,
    Int64Array = 8,
    Uint64 = 9,
    Uint64Array = 10,
    Float64 = 11,
    Float64Array = 12,
    Float32 = 13,
    Float32Array = 14,
    Binary = 15,
    String = 16,
    StringArray = 17,
    Object = 18,
    ObjectArray = 19,
}

impl NodeType {
    /// Every node type, in discriminant order.
    pub const ALL: [NodeType; 20] = [
        NodeType::Null,
        NodeType::Bool,
        NodeType::BoolArray,
        NodeType::Int32,
        NodeType::Int32Array,
        NodeType::Uint32,
        NodeType::Uint32Array,
        NodeType::Int64,
        NodeType::Int64Array,
        NodeType::Uint64,
        NodeType::Uint64Array,
        NodeType::Float64,
        NodeType::Float64Array,
        NodeType::Float32,
        NodeType::Float32Array,
        NodeType::Binary,
        NodeType::String,
        NodeType::StringArray,
        NodeType::Object,
        NodeType::ObjectArray,
    ];

    /// Single inline values (`Null` excluded).
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            NodeType::Bool
                | NodeType::Int32
                | NodeType::Uint32
                | NodeType::Int64
                | NodeType::Uint64
                | NodeType::Float32
                | NodeType::Float64
        )
    }

    /// Arrays of primitives or strings; these are the types that can carry
    /// the enum flag.
    pub fn is_value_array(self) -> bool {
        matches!(
            self,
            NodeType::BoolArray
                | NodeType::Int32Array
                | NodeType::Uint32Array
                | NodeType::Int64Array
                | NodeType::Uint64Array
                | NodeType::Float32Array
                | NodeType::Float64Array
                | NodeType::StringArray
        )
    }
}

impl TryFrom<u8> for NodeType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        NodeType::ALL.get(usize::from(value)).copied().ok_or(value)
    }
}

/// The value held by a node. Exactly one variant is live, selected by type.
///
/// Strings are stored with their terminating NUL; an empty string payload is
/// a null string. String array entries follow the same rule, with `None`
/// marking a null entry. Object array elements are unnamed `Object` nodes
/// that all share one property layout.
#[derive(Debug, Default)]
pub enum NodeValue {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    BoolArray(Box<[bool]>),
    Int32Array(Box<[i32]>),
    Uint32Array(Box<[u32]>),
    Int64Array(Box<[i64]>),
    Uint64Array(Box<[u64]>),
    Float32Array(Box<[f32]>),
    Float64Array(Box<[f64]>),
    Binary(Box<[u8]>),
    String(Box<[u8]>),
    StringArray(Box<[Option<Box<[u8]>>]>),
    Object(Box<[JsonNode]>),
    ObjectArray(Box<[JsonNode]>),
}

impl NodeValue {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeValue::Null => NodeType::Null,
            NodeValue::Bool(_) => NodeType::Bool,
            NodeValue::Int32(_) => NodeType::Int32,
            NodeValue::Uint32(_) => NodeType::Uint32,
            NodeValue::Int64(_) => NodeType::Int64,
            NodeValue::Uint64(_) => NodeType::Uint64,
            NodeValue::Float32(_) => NodeType::Float32,
            NodeValue::Float64(_) => NodeType::Float64,
            NodeValue::BoolArray(_) => NodeType::BoolArray,
            NodeValue::Int32Array(_) => NodeType::Int32Array,
            NodeValue::Uint32Array(_) => NodeType::Uint32Array,
            NodeValue::Int64Array(_) => NodeType::Int64Array,
            NodeValue::Uint64Array(_) => NodeType::Uint64Array,
            NodeValue::Float32Array(_) => NodeType::Float32Array,
            NodeValue::Float64Array(_) => NodeType::Float64Array,
            NodeValue::Binary(_) => NodeType::Binary,
            NodeValue::String(_) => NodeType::String,
            NodeValue::StringArray(_) => NodeType::StringArray,
            NodeValue::Object(_) => NodeType::Object,
            NodeValue::ObjectArray(_) => NodeType::ObjectArray,
        }
    }

    /// Element count, byte length, or 1 for scalars; not clamped.
    pub(crate) fn raw_len(&self) -> usize {
        match self {
            NodeValue::Null => 0,
            NodeValue::Bool(_)
            | NodeValue::Int32(_)
            | NodeValue::Uint32(_)
            | NodeValue::Int64(_)
            | NodeValue::Uint64(_)
            | NodeValue::Float32(_)
            | NodeValue::Float64(_) => 1,
            NodeValue::BoolArray(v) => v.len(),
            NodeValue::Int32Array(v) => v.len(),
            NodeValue::Uint32Array(v) => v.len(),
            NodeValue::Int64Array(v) => v.len(),
            NodeValue::Uint64Array(v) => v.len(),
            NodeValue::Float32Array(v) => v.len(),
            NodeValue::Float64Array(v) => v.len(),
            NodeValue::Binary(v) | NodeValue::String(v) => v.len(),
            NodeValue::StringArray(v) => v.len(),
            NodeValue::Object(v) | NodeValue::ObjectArray(v) => v.len(),
        }
    }

    /// Calls `charge` with the size of every allocation this value owns, in
    /// the order the builder requests them. Child nodes are not visited.
    pub(crate) fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        fn array<T>(values: &[T], charge: &mut dyn FnMut(usize)) {
            if !values.is_empty() {
                charge(std::mem::size_of_val(values));
            }
        }

        match self {
            NodeValue::Null
            | NodeValue::Bool(_)
            | NodeValue::Int32(_)
            | NodeValue::Uint32(_)
            | NodeValue::Int64(_)
            | NodeValue::Uint64(_)
            | NodeValue::Float32(_)
            | NodeValue::Float64(_) => {}
            NodeValue::BoolArray(v) => array(v, charge),
            NodeValue::Int32Array(v) => array(v, charge),
            NodeValue::Uint32Array(v) => array(v, charge),
            NodeValue::Int64Array(v) => array(v, charge),
            NodeValue::Uint64Array(v) => array(v, charge),
            NodeValue::Float32Array(v) => array(v, charge),
            NodeValue::Float64Array(v) => array(v, charge),
            NodeValue::Binary(v) | NodeValue::String(v) => array(v, charge),
            NodeValue::StringArray(entries) => string_array_allocations(
                entries.len(),
                entries.iter().map(|e| e.as_deref().map(<[u8]>::len)),
                charge,
            ),
            NodeValue::Object(children) => charge(NODE_SIZE * children.len()),
            NodeValue::ObjectArray(elements) => {
                let properties = elements.first().map_or(0, |e| e.children().len());
                charge(NODE_SIZE * (properties + 1) * elements.len());
            }
        }
    }

    /// Copy of a value that owns no child nodes.
    pub(crate) fn clone_leaf(&self) -> Option<NodeValue> {
        Some(match self {
            NodeValue::Null => NodeValue::Null,
            NodeValue::Bool(v) => NodeValue::Bool(*v),
            NodeValue::Int32(v) => NodeValue::Int32(*v),
            NodeValue::Uint32(v) => NodeValue::Uint32(*v),
            NodeValue::Int64(v) => NodeValue::Int64(*v),
            NodeValue::Uint64(v) => NodeValue::Uint64(*v),
            NodeValue::Float32(v) => NodeValue::Float32(*v),
            NodeValue::Float64(v) => NodeValue::Float64(*v),
            NodeValue::BoolArray(v) => NodeValue::BoolArray(v.clone()),
            NodeValue::Int32Array(v) => NodeValue::Int32Array(v.clone()),
            NodeValue::Uint32Array(v) => NodeValue::Uint32Array(v.clone()),
            NodeValue::Int64Array(v) => NodeValue::Int64Array(v.clone()),
            NodeValue::Uint64Array(v) => NodeValue::Uint64Array(v.clone()),
            NodeValue::Float32Array(v) => NodeValue::Float32Array(v.clone()),
            NodeValue::Float64Array(v) => NodeValue::Float64Array(v.clone()),
            NodeValue::Binary(v) => NodeValue::Binary(v.clone()),
            NodeValue::String(v) => NodeValue::String(v.clone()),
            NodeValue::StringArray(v) => NodeValue::StringArray(v.clone()),
            NodeValue::Object(_) | NodeValue::ObjectArray(_) => return None,
        })
    }
}

/// Allocations of a string array: the pointer table, then each non-null
/// string (terminator included).
pub(crate) fn string_array_allocations(
    count: usize,
    stored_lens: impl Iterator<Item = Option<usize>>,
    charge: &mut dyn FnMut(usize),
) {
    if count == 0 {
        return;
    }
    charge(POINTER_SIZE * count);
    for len in stored_lens.flatten() {
        charge(len);
    }
}

/// Strip the terminator from stored string bytes.
pub(crate) fn str_content(stored: &[u8]) -> &[u8] {
    match stored.split_last() {
        Some((0, content)) => content,
        _ => stored,
    }
}

/// One field or sub-object of an event.
///
/// A default node is empty (`Null`, no name, no flags). Nodes are populated
/// through a [`JsonBuilder`](crate::JsonBuilder) so every allocation is
/// charged to an allocator, and emptied with
/// [`clear_json_tree`](crate::clear_json_tree).
#[derive(Debug, Default)]
pub struct JsonNode {
    pub(crate) flags: NodeFlags,
    pub(crate) name: Option<Box<str>>,
    pub(crate) value: NodeValue,
}

impl JsonNode {
    /// Version of the node layout.
    pub const VERSION: u32 = 0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_type(&self) -> NodeType {
        self.value.node_type()
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Stored name length including its terminator, 0 without a name.
    pub fn name_len(&self) -> u16 {
        self.name
            .as_ref()
            .map_or(0, |n| n.len().saturating_add(1).min(usize::from(u16::MAX)) as u16)
    }

    /// Element count for arrays and objects, byte length (terminator
    /// included) for strings and binary, 1 for scalars and 0 for `Null`.
    pub fn len(&self) -> u16 {
        self.value.raw_len().min(usize::from(u16::MAX)) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self) -> &NodeValue {
        &self.value
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(NodeFlags::CONST)
    }

    pub fn is_fixed_length(&self) -> bool {
        self.flags.contains(NodeFlags::FIXED_LENGTH)
    }

    pub fn is_enum(&self) -> bool {
        self.flags.contains(NodeFlags::ENUM)
    }

    /// Properties of an object, or elements of an object array.
    pub fn children(&self) -> &[JsonNode] {
        match &self.value {
            NodeValue::Object(c) | NodeValue::ObjectArray(c) => c,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [JsonNode] {
        match &mut self.value {
            NodeValue::Object(c) | NodeValue::ObjectArray(c) => c,
            _ => &mut [],
        }
    }

    /// Child node by position.
    pub fn child(&self, index: usize) -> Option<&JsonNode> {
        self.children().get(index)
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut JsonNode> {
        self.children_mut().get_mut(index)
    }

    /// Property of an object by name.
    pub fn property(&self, name: &str) -> Option<&JsonNode> {
        match &self.value {
            NodeValue::Object(c) => c.iter().find(|p| p.name() == Some(name)),
            _ => None,
        }
    }

    /// String content without its terminator. `None` for other types and for
    /// a null string.
    pub fn str_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            NodeValue::String(s) if !s.is_empty() => Some(str_content(s)),
            _ => None,
        }
    }

    /// Name used in log and error messages.
    pub(crate) fn label(&self) -> String {
        self.name().unwrap_or("<unnamed>").to_string()
    }
}
