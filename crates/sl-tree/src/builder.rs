//! Node construction.

use std::ffi::CStr;

use tracing::error;

use crate::node::string_array_allocations;
use crate::{Allocator, JsonNode, NodeValue, Result, TreeError, NODE_SIZE};

const MAX_LEN: usize = u16::MAX as usize;

/// Data that can be stored in a node by [`JsonBuilder::set_node`].
///
/// Implemented for the scalar types, slices, arrays and vectors of them,
/// `str`, `CStr`, [`Binary`], and lists of optional strings.
pub trait NodeData {
    /// Calls `charge` with the size of each allocation the stored value needs.
    fn allocations(&self, charge: &mut dyn FnMut(usize));

    /// Copy the data into an owned node value.
    fn to_value(&self) -> NodeValue;
}

/// Raw bytes stored as a binary node.
#[derive(Debug, Clone, Copy)]
pub struct Binary<'a>(pub &'a [u8]);

macro_rules! scalar_data {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl NodeData for $ty {
                fn allocations(&self, _charge: &mut dyn FnMut(usize)) {}

                fn to_value(&self) -> NodeValue {
                    NodeValue::$variant(*self)
                }
            }
        )*
    };
}

scalar_data!(
    bool => Bool,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
);

macro_rules! array_data {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl NodeData for [$ty] {
                fn allocations(&self, charge: &mut dyn FnMut(usize)) {
                    if !self.is_empty() {
                        charge(std::mem::size_of_val(self));
                    }
                }

                fn to_value(&self) -> NodeValue {
                    NodeValue::$variant(self.into())
                }
            }

            impl<const N: usize> NodeData for [$ty; N] {
                fn allocations(&self, charge: &mut dyn FnMut(usize)) {
                    self.as_slice().allocations(charge)
                }

                fn to_value(&self) -> NodeValue {
                    self.as_slice().to_value()
                }
            }

            impl NodeData for Vec<$ty> {
                fn allocations(&self, charge: &mut dyn FnMut(usize)) {
                    self.as_slice().allocations(charge)
                }

                fn to_value(&self) -> NodeValue {
                    self.as_slice().to_value()
                }
            }
        )*
    };
}

array_data!(
    bool => BoolArray,
    i32 => Int32Array,
    u32 => Uint32Array,
    i64 => Int64Array,
    u64 => Uint64Array,
    f32 => Float32Array,
    f64 => Float64Array,
);

fn terminated(content: &[u8]) -> Box<[u8]> {
    let mut stored = Vec::with_capacity(content.len() + 1);
    stored.extend_from_slice(content);
    stored.push(0);
    stored.into_boxed_slice()
}

impl NodeData for str {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        charge(self.len() + 1);
    }

    fn to_value(&self) -> NodeValue {
        NodeValue::String(terminated(self.as_bytes()))
    }
}

impl NodeData for String {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        self.as_str().allocations(charge)
    }

    fn to_value(&self) -> NodeValue {
        self.as_str().to_value()
    }
}

impl NodeData for CStr {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        charge(self.to_bytes_with_nul().len());
    }

    fn to_value(&self) -> NodeValue {
        NodeValue::String(self.to_bytes_with_nul().into())
    }
}

impl NodeData for Binary<'_> {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        if !self.0.is_empty() {
            charge(self.0.len());
        }
    }

    fn to_value(&self) -> NodeValue {
        NodeValue::Binary(self.0.into())
    }
}

impl<'s> NodeData for [Option<&'s str>] {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        string_array_allocations(
            self.len(),
            self.iter().map(|s| s.map(|s| s.len() + 1)),
            charge,
        );
    }

    fn to_value(&self) -> NodeValue {
        NodeValue::StringArray(
            self.iter()
                .map(|s| s.map(|s| terminated(s.as_bytes())))
                .collect(),
        )
    }
}

impl<'s, const N: usize> NodeData for [Option<&'s str>; N] {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        self.as_slice().allocations(charge)
    }

    fn to_value(&self) -> NodeValue {
        self.as_slice().to_value()
    }
}

impl<'s> NodeData for Vec<Option<&'s str>> {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        self.as_slice().allocations(charge)
    }

    fn to_value(&self) -> NodeValue {
        self.as_slice().to_value()
    }
}

/// A leaf value assembled by the caller, such as a schema loader.
///
/// Object values own child nodes and are stored as `Null`; build those with
/// [`JsonBuilder::create_object`] and [`JsonBuilder::create_object_array`].
impl NodeData for NodeValue {
    fn allocations(&self, charge: &mut dyn FnMut(usize)) {
        if !matches!(self, NodeValue::Object(_) | NodeValue::ObjectArray(_)) {
            NodeValue::allocations(self, charge);
        }
    }

    fn to_value(&self) -> NodeValue {
        self.clone_leaf().unwrap_or_default()
    }
}

/// Builds node trees, charging every allocation to an [`Allocator`].
///
/// Every creating call requires an empty node (`Null`, name allowed). A
/// failed call leaves the node's value unchanged; after an allocation
/// failure the caller should clear and discard the whole tree.
pub struct JsonBuilder<'a, A: Allocator + ?Sized> {
    alloc: &'a mut A,
}

impl<'a, A: Allocator + ?Sized> JsonBuilder<'a, A> {
    pub fn new(alloc: &'a mut A) -> Self {
        Self { alloc }
    }

    pub fn allocator(&mut self) -> &mut A {
        &mut *self.alloc
    }

    /// Turn `node` into an object with `property_count` empty properties.
    pub fn create_object(&mut self, node: &mut JsonNode, property_count: u16) -> Result<()> {
        ensure_empty(node)?;
        self.charge(node, NODE_SIZE * usize::from(property_count))?;
        node.value = NodeValue::Object(empty_nodes(property_count));
        Ok(())
    }

    /// Turn `node` into an array of `len` objects with `property_count`
    /// empty properties each.
    ///
    /// The elements and all of their properties are charged as one block.
    /// A schema describes an object array with a single element.
    pub fn create_object_array(
        &mut self,
        node: &mut JsonNode,
        property_count: u16,
        len: u16,
    ) -> Result<()> {
        ensure_empty(node)?;
        let size = NODE_SIZE * (usize::from(property_count) + 1) * usize::from(len);
        self.charge(node, size)?;
        node.value = NodeValue::ObjectArray(
            (0..len)
                .map(|_| JsonNode {
                    value: NodeValue::Object(empty_nodes(property_count)),
                    ..JsonNode::default()
                })
                .collect(),
        );
        Ok(())
    }

    /// Store a scalar, array, string, or binary value in `node`.
    pub fn set_node<T: NodeData + ?Sized>(&mut self, node: &mut JsonNode, data: &T) -> Result<()> {
        ensure_empty(node)?;
        self.store(node, data.to_value())
    }

    /// Replace the name of `node`; `None` removes it.
    pub fn set_name(&mut self, node: &mut JsonNode, name: Option<&str>) -> Result<()> {
        if let Some(old) = node.name.take() {
            self.alloc.dealloc(old.len() + 1);
        }
        let Some(name) = name else {
            return Ok(());
        };
        let stored = name.len() + 1;
        if stored > MAX_LEN {
            let err = TreeError::StringTooLong {
                node: name.chars().take(64).collect(),
                len: stored,
            };
            error!(error = %err, "rejected node name");
            return Err(err);
        }
        self.charge(node, stored)?;
        node.name = Some(name.into());
        Ok(())
    }

    /// Copy `src` and everything below it into the empty node `dst`.
    ///
    /// On failure `dst` is cleared before the error is returned.
    pub fn deep_copy(&mut self, src: &JsonNode, dst: &mut JsonNode) -> Result<()> {
        ensure_empty(dst)?;
        let result = self.copy_into(src, dst);
        if result.is_err() {
            clear_json_tree(dst, &mut *self.alloc);
        }
        result
    }

    fn copy_into(&mut self, src: &JsonNode, dst: &mut JsonNode) -> Result<()> {
        self.set_name(dst, src.name())?;
        dst.flags = src.flags;
        match &src.value {
            NodeValue::Object(children) => {
                self.create_object(dst, clamp(children.len()))?;
                for (from, to) in children.iter().zip(dst.children_mut()) {
                    self.copy_into(from, to)?;
                }
            }
            NodeValue::ObjectArray(elements) => {
                let properties = elements.first().map_or(0, |e| e.children().len());
                self.create_object_array(dst, clamp(properties), clamp(elements.len()))?;
                for (from, to) in elements.iter().zip(dst.children_mut()) {
                    to.flags = from.flags;
                    for (p, q) in from.children().iter().zip(to.children_mut()) {
                        self.copy_into(p, q)?;
                    }
                }
            }
            leaf => self.store(dst, leaf.clone_leaf().unwrap_or_default())?,
        }
        Ok(())
    }

    /// Validate and charge `value`, then move it into `node`.
    pub(crate) fn store(&mut self, node: &mut JsonNode, value: NodeValue) -> Result<()> {
        let len = value.raw_len();
        if len > MAX_LEN {
            let err = match value {
                NodeValue::String(_) => TreeError::StringTooLong {
                    node: node.label(),
                    len,
                },
                _ => TreeError::ArrayTooLong {
                    node: node.label(),
                    len,
                },
            };
            error!(error = %err, "rejected node value");
            return Err(err);
        }

        let mut granted = Vec::new();
        let mut refused = None;
        {
            let alloc = &mut *self.alloc;
            value.allocations(&mut |size| {
                if refused.is_some() {
                    return;
                }
                match alloc.alloc(size) {
                    Ok(()) => granted.push(size),
                    Err(_) => refused = Some(size),
                }
            });
        }
        if let Some(size) = refused {
            for size in granted {
                self.alloc.dealloc(size);
            }
            return Err(out_of_memory(node, size));
        }

        node.value = value;
        Ok(())
    }

    fn charge(&mut self, node: &JsonNode, size: usize) -> Result<()> {
        self.alloc
            .alloc(size)
            .map_err(|_| out_of_memory(node, size))
    }
}

fn out_of_memory(node: &JsonNode, requested: usize) -> TreeError {
    let err = TreeError::OutOfMemory {
        node: node.label(),
        requested,
    };
    error!(error = %err, "node allocation failed");
    err
}

fn ensure_empty(node: &JsonNode) -> Result<()> {
    match node.value {
        NodeValue::Null => Ok(()),
        _ => Err(TreeError::NodeNotEmpty {
            node: node.label(),
            node_type: node.node_type(),
        }),
    }
}

fn empty_nodes(count: u16) -> Box<[JsonNode]> {
    (0..count).map(|_| JsonNode::default()).collect()
}

fn clamp(len: usize) -> u16 {
    len.min(MAX_LEN) as u16
}

/// Release everything `node` owns back to `alloc` and reset it to an empty
/// node.
///
/// `alloc` must be the allocator the tree was built with.
pub fn clear_json_tree<A: Allocator + ?Sized>(node: &mut JsonNode, alloc: &mut A) {
    match &mut node.value {
        NodeValue::Object(children) => {
            for child in children.iter_mut() {
                clear_json_tree(child, alloc);
            }
        }
        NodeValue::ObjectArray(elements) => {
            // element headers share the array's block; only their contents
            // are released one by one
            for element in elements.iter_mut() {
                if let Some(name) = element.name.take() {
                    alloc.dealloc(name.len() + 1);
                }
                for property in element.children_mut() {
                    clear_json_tree(property, alloc);
                }
            }
        }
        _ => {}
    }
    node.value.allocations(&mut |size| alloc.dealloc(size));
    if let Some(name) = node.name.take() {
        alloc.dealloc(name.len() + 1);
    }
    *node = JsonNode::default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockAllocator, HeapAllocator, JsonTreeSizeCalculator, NodeType};

    fn build_event<A: Allocator + ?Sized>(b: &mut JsonBuilder<'_, A>, root: &mut JsonNode) -> Result<()> {
        b.create_object(root, 3)?;
        let props = root.children_mut();
        b.set_name(&mut props[0], Some("name"))?;
        b.set_node(&mut props[0], "abc")?;
        b.set_name(&mut props[1], Some("count"))?;
        b.set_node(&mut props[1], &7i32)?;
        b.set_name(&mut props[2], Some("tags"))?;
        b.set_node(&mut props[2], &[Some("x"), None, Some("yz")])?;
        Ok(())
    }

    fn track_event(calc: &mut JsonTreeSizeCalculator) {
        calc.track_object(3);
        calc.track_name("name");
        calc.track("abc");
        calc.track_name("count");
        calc.track(&7i32);
        calc.track_name("tags");
        calc.track(&[Some("x"), None, Some("yz")]);
    }

    #[test]
    fn measured_block_fits_exactly() {
        let mut calc = JsonTreeSizeCalculator::new();
        track_event(&mut calc);

        let mut block = BlockAllocator::with_capacity(calc.size());
        let mut root = JsonNode::new();
        build_event(&mut JsonBuilder::new(&mut block), &mut root).unwrap();
        assert_eq!(block.remaining(), 0);
        assert_eq!(root.child(0).unwrap().str_bytes(), Some(b"abc".as_slice()));
        assert_eq!(root.child(2).unwrap().len(), 3);
    }

    #[test]
    fn short_block_fails_allocation() {
        let mut calc = JsonTreeSizeCalculator::new();
        track_event(&mut calc);

        let mut block = BlockAllocator::with_capacity(calc.size() - 8);
        let mut root = JsonNode::new();
        let err = build_event(&mut JsonBuilder::new(&mut block), &mut root).unwrap_err();
        assert!(matches!(err, TreeError::OutOfMemory { .. }));
    }

    #[test]
    fn failed_set_node_leaves_node_untouched() {
        let mut heap = HeapAllocator::with_limit(4);
        let mut node = JsonNode::new();
        let mut b = JsonBuilder::new(&mut heap);
        assert!(b.set_node(&mut node, &[1u64, 2]).is_err());
        assert_eq!(node.node_type(), NodeType::Null);
        assert_eq!(heap.in_use(), 0);
    }

    #[test]
    fn string_array_rolls_back_partial_allocations() {
        // pointer table (16) fits, second string does not
        let mut heap = HeapAllocator::with_limit(16 + 4);
        let mut node = JsonNode::new();
        let err = JsonBuilder::new(&mut heap)
            .set_node(&mut node, &[Some("abc"), Some("defg")])
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::OutOfMemory {
                node: "<unnamed>".into(),
                requested: 5
            }
        );
        assert_eq!(heap.in_use(), 0);
        assert_eq!(node.node_type(), NodeType::Null);
    }

    #[test]
    fn creating_over_a_populated_node_is_rejected() {
        let mut heap = HeapAllocator::new();
        let mut b = JsonBuilder::new(&mut heap);
        let mut node = JsonNode::new();
        b.set_node(&mut node, &true).unwrap();
        assert!(matches!(
            b.create_object(&mut node, 1),
            Err(TreeError::NodeNotEmpty {
                node_type: NodeType::Bool,
                ..
            })
        ));
    }

    #[test]
    fn overlong_string_is_rejected() {
        let mut heap = HeapAllocator::new();
        let long = "x".repeat(MAX_LEN);
        let mut node = JsonNode::new();
        let err = JsonBuilder::new(&mut heap).set_node(&mut node, long.as_str()).unwrap_err();
        assert!(matches!(err, TreeError::StringTooLong { len, .. } if len == MAX_LEN + 1));
    }

    #[test]
    fn object_array_elements_share_layout() {
        let mut heap = HeapAllocator::new();
        let mut node = JsonNode::new();
        JsonBuilder::new(&mut heap)
            .create_object_array(&mut node, 2, 3)
            .unwrap();
        assert_eq!(node.node_type(), NodeType::ObjectArray);
        assert_eq!(node.len(), 3);
        assert!(node
            .children()
            .iter()
            .all(|e| e.node_type() == NodeType::Object && e.len() == 2));
        assert_eq!(heap.in_use(), NODE_SIZE * 3 * 3);
    }

    #[test]
    fn deep_copy_then_clear_returns_all_memory() {
        let mut heap = HeapAllocator::new();
        let mut src = JsonNode::new();
        build_event(&mut JsonBuilder::new(&mut heap), &mut src).unwrap();
        let built = heap.in_use();

        let mut dst = JsonNode::new();
        JsonBuilder::new(&mut heap).deep_copy(&src, &mut dst).unwrap();
        assert_eq!(heap.in_use(), 2 * built);
        assert!(crate::compare_json_trees(&src, &dst, crate::CompareFuzz::Strict));

        clear_json_tree(&mut dst, &mut heap);
        clear_json_tree(&mut src, &mut heap);
        assert_eq!(heap.in_use(), 0);
        assert_eq!(dst.node_type(), NodeType::Null);
    }

    #[test]
    fn failed_deep_copy_clears_destination() {
        let mut heap = HeapAllocator::new();
        let mut src = JsonNode::new();
        build_event(&mut JsonBuilder::new(&mut heap), &mut src).unwrap();

        let mut small = HeapAllocator::with_limit(80);
        let mut dst = JsonNode::new();
        assert!(JsonBuilder::new(&mut small).deep_copy(&src, &mut dst).is_err());
        assert_eq!(dst.node_type(), NodeType::Null);
        assert_eq!(small.in_use(), 0);
    }

    #[test]
    fn set_name_replaces_previous_name() {
        let mut heap = HeapAllocator::new();
        let mut node = JsonNode::new();
        let mut b = JsonBuilder::new(&mut heap);
        b.set_name(&mut node, Some("first")).unwrap();
        b.set_name(&mut node, Some("second")).unwrap();
        assert_eq!(node.name(), Some("second"));
        assert_eq!(heap.in_use(), 7);
        JsonBuilder::new(&mut heap).set_name(&mut node, None).unwrap();
        assert_eq!(heap.in_use(), 0);
    }

    #[test]
    fn prepared_values_are_charged_like_their_source() {
        let value = NodeValue::Int64Array(vec![1, 2, 3].into_boxed_slice());
        let mut calc = JsonTreeSizeCalculator::new();
        calc.track(&value);
        assert_eq!(calc.size(), 24);

        let mut heap = HeapAllocator::new();
        let mut node = JsonNode::new();
        JsonBuilder::new(&mut heap).set_node(&mut node, &value).unwrap();
        assert_eq!(node.len(), 3);
        assert_eq!(heap.in_use(), 24);

        let mut object = JsonNode::new();
        let children = NodeValue::Object(vec![JsonNode::new()].into_boxed_slice());
        JsonBuilder::new(&mut heap).set_node(&mut object, &children).unwrap();
        assert_eq!(object.node_type(), NodeType::Null);
    }
}
