//! Scope-bound node cleanup.

use std::ops::{Deref, DerefMut};

use crate::{clear_json_tree, Allocator, JsonBuilder, JsonNode};

/// A node that is cleared through its allocator when dropped.
pub struct TempJsonNode<'a, A: Allocator + ?Sized> {
    node: JsonNode,
    alloc: &'a mut A,
}

impl<'a, A: Allocator + ?Sized> TempJsonNode<'a, A> {
    pub fn new(alloc: &'a mut A) -> Self {
        Self {
            node: JsonNode::default(),
            alloc,
        }
    }

    /// The node together with a builder over the same allocator.
    pub fn parts(&mut self) -> (&mut JsonNode, JsonBuilder<'_, A>) {
        (&mut self.node, JsonBuilder::new(&mut *self.alloc))
    }

    /// Keep the tree past this scope; the caller becomes responsible for
    /// clearing it.
    pub fn into_node(mut self) -> JsonNode {
        std::mem::take(&mut self.node)
    }
}

impl<A: Allocator + ?Sized> Deref for TempJsonNode<'_, A> {
    type Target = JsonNode;

    fn deref(&self) -> &JsonNode {
        &self.node
    }
}

impl<A: Allocator + ?Sized> DerefMut for TempJsonNode<'_, A> {
    fn deref_mut(&mut self) -> &mut JsonNode {
        &mut self.node
    }
}

impl<A: Allocator + ?Sized> Drop for TempJsonNode<'_, A> {
    fn drop(&mut self) {
        clear_json_tree(&mut self.node, &mut *self.alloc);
    }
}
