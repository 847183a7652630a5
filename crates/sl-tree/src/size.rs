//! Tree size measurement.

use crate::{fixup_alignment, JsonNode, NodeData, NODE_SIZE};

/// Measures the memory a node tree needs before it is built.
///
/// Track every node the tree will have; [`size`](Self::size) is then the
/// capacity of a [`BlockAllocator`](crate::BlockAllocator) that the matching
/// [`JsonBuilder`](crate::JsonBuilder) calls fill exactly. Each tracked
/// allocation is rounded up to the allocator's alignment, so tracking order
/// does not have to match build order.
#[derive(Debug, Clone, Default)]
pub struct JsonTreeSizeCalculator {
    size: usize,
}

impl JsonTreeSizeCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes required so far.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Track a root node that lives in the allocated block itself.
    pub fn track_root(&mut self) {
        self.size += NODE_SIZE;
    }

    /// Track [`JsonBuilder::create_object`](crate::JsonBuilder::create_object).
    pub fn track_object(&mut self, property_count: usize) {
        self.add(NODE_SIZE * property_count);
    }

    /// Track [`JsonBuilder::create_object_array`](crate::JsonBuilder::create_object_array).
    pub fn track_object_array(&mut self, property_count: usize, len: usize) {
        self.add(NODE_SIZE * (property_count + 1) * len);
    }

    /// Track [`JsonBuilder::set_name`](crate::JsonBuilder::set_name).
    pub fn track_name(&mut self, name: &str) {
        self.add(name.len() + 1);
    }

    /// Track [`JsonBuilder::set_node`](crate::JsonBuilder::set_node) with the
    /// same data.
    pub fn track<T: NodeData + ?Sized>(&mut self, data: &T) {
        data.allocations(&mut |size| self.add(size));
    }

    /// Track a deep copy of `node` and everything below it.
    pub fn track_node(&mut self, node: &JsonNode) {
        if let Some(name) = node.name() {
            self.track_name(name);
        }
        node.value().allocations(&mut |size| self.add(size));
        if node.node_type() == crate::NodeType::ObjectArray {
            for element in node.children() {
                for property in element.children() {
                    self.track_node(property);
                }
            }
        } else {
            for child in node.children() {
                self.track_node(child);
            }
        }
    }

    fn add(&mut self, size: usize) {
        self.size += fixup_alignment(size);
    }
}
