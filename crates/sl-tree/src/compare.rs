//! Structural tree comparison.

use crate::{JsonNode, NodeValue};

/// How strictly [`compare_json_trees`] treats the order of children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareFuzz {
    /// Children must appear in the same order.
    #[default]
    Strict,
    /// Constant children may appear in any order; the others must keep
    /// their relative order.
    NoConstOrder,
    /// Children may appear in any order.
    NoOrder,
}

/// Deep structural equality of two trees.
///
/// Types, flags, lengths, names and values must all match. Floats compare by
/// bit pattern, so a tree always equals itself. `fuzz` applies at every level.
pub fn compare_json_trees(a: &JsonNode, b: &JsonNode, fuzz: CompareFuzz) -> bool {
    if a.flags() != b.flags()
        || a.node_type() != b.node_type()
        || a.len() != b.len()
        || a.name() != b.name()
    {
        return false;
    }

    match (a.value(), b.value()) {
        (NodeValue::Null, NodeValue::Null) => true,
        (NodeValue::Bool(x), NodeValue::Bool(y)) => x == y,
        (NodeValue::Int32(x), NodeValue::Int32(y)) => x == y,
        (NodeValue::Uint32(x), NodeValue::Uint32(y)) => x == y,
        (NodeValue::Int64(x), NodeValue::Int64(y)) => x == y,
        (NodeValue::Uint64(x), NodeValue::Uint64(y)) => x == y,
        (NodeValue::Float32(x), NodeValue::Float32(y)) => x.to_bits() == y.to_bits(),
        (NodeValue::Float64(x), NodeValue::Float64(y)) => x.to_bits() == y.to_bits(),
        (NodeValue::BoolArray(x), NodeValue::BoolArray(y)) => x == y,
        (NodeValue::Int32Array(x), NodeValue::Int32Array(y)) => x == y,
        (NodeValue::Uint32Array(x), NodeValue::Uint32Array(y)) => x == y,
        (NodeValue::Int64Array(x), NodeValue::Int64Array(y)) => x == y,
        (NodeValue::Uint64Array(x), NodeValue::Uint64Array(y)) => x == y,
        (NodeValue::Float32Array(x), NodeValue::Float32Array(y)) => {
            x.iter().map(|f| f.to_bits()).eq(y.iter().map(|f| f.to_bits()))
        }
        (NodeValue::Float64Array(x), NodeValue::Float64Array(y)) => {
            x.iter().map(|f| f.to_bits()).eq(y.iter().map(|f| f.to_bits()))
        }
        (NodeValue::Binary(x), NodeValue::Binary(y)) => x == y,
        (NodeValue::String(x), NodeValue::String(y)) => x == y,
        (NodeValue::StringArray(x), NodeValue::StringArray(y)) => x == y,
        (NodeValue::Object(x), NodeValue::Object(y))
        | (NodeValue::ObjectArray(x), NodeValue::ObjectArray(y)) => compare_children(x, y, fuzz),
        _ => false,
    }
}

// Children are compared with the caller's `fuzz`, not strictly, so a nested
// object's members may move as freely as the root's.
fn compare_children(a: &[JsonNode], b: &[JsonNode], fuzz: CompareFuzz) -> bool {
    match fuzz {
        CompareFuzz::Strict => a
            .iter()
            .zip(b)
            .all(|(x, y)| compare_json_trees(x, y, fuzz)),
        CompareFuzz::NoOrder => {
            let a: Vec<&JsonNode> = a.iter().collect();
            let b: Vec<&JsonNode> = b.iter().collect();
            match_unordered(&a, &b, fuzz)
        }
        CompareFuzz::NoConstOrder => {
            let (a_const, a_vars): (Vec<&JsonNode>, Vec<&JsonNode>) =
                a.iter().partition(|n| n.is_const());
            let (b_const, b_vars): (Vec<&JsonNode>, Vec<&JsonNode>) =
                b.iter().partition(|n| n.is_const());
            a_vars.len() == b_vars.len()
                && a_vars
                    .iter()
                    .zip(&b_vars)
                    .all(|(x, y)| compare_json_trees(x, y, fuzz))
                && match_unordered(&a_const, &b_const, fuzz)
        }
    }
}

/// Pair every node of `a` with a distinct equal node of `b`.
///
/// Each node takes the first free match; with equality as the criterion the
/// choice between equal candidates does not change the outcome.
fn match_unordered(a: &[&JsonNode], b: &[&JsonNode], fuzz: CompareFuzz) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut taken = vec![false; b.len()];
    a.iter().all(|x| {
        let hit = b
            .iter()
            .enumerate()
            .position(|(j, y)| !taken[j] && compare_json_trees(x, y, fuzz));
        match hit {
            Some(j) => {
                taken[j] = true;
                true
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{set_flags, FlagPolicy, HeapAllocator, JsonBuilder, NodeFlags};

    /// Object whose properties are `(name, value, const)` int32 fields.
    fn object(fields: &[(&str, i32, bool)]) -> JsonNode {
        let mut heap = HeapAllocator::new();
        let mut b = JsonBuilder::new(&mut heap);
        let mut root = JsonNode::new();
        b.create_object(&mut root, fields.len() as u16).unwrap();
        for (node, &(name, value, constant)) in root.children_mut().iter_mut().zip(fields) {
            b.set_name(node, Some(name)).unwrap();
            b.set_node(node, &value).unwrap();
            if constant {
                set_flags(node, NodeFlags::CONST, FlagPolicy::Strict).unwrap();
            }
        }
        root
    }

    #[test]
    fn identical_trees_are_equal() {
        let a = object(&[("a", 1, false), ("b", 2, true)]);
        let b = object(&[("a", 1, false), ("b", 2, true)]);
        assert!(compare_json_trees(&a, &b, CompareFuzz::Strict));
    }

    #[test]
    fn order_matters_only_when_strict() {
        let a = object(&[("a", 1, false), ("b", 2, false)]);
        let b = object(&[("b", 2, false), ("a", 1, false)]);
        assert!(!compare_json_trees(&a, &b, CompareFuzz::Strict));
        assert!(!compare_json_trees(&a, &b, CompareFuzz::NoConstOrder));
        assert!(compare_json_trees(&a, &b, CompareFuzz::NoOrder));
    }

    /// Object with a single property `inner` holding a copy of `inner`.
    fn wrap(inner: &JsonNode) -> JsonNode {
        let mut heap = HeapAllocator::new();
        let mut b = JsonBuilder::new(&mut heap);
        let mut root = JsonNode::new();
        b.create_object(&mut root, 1).unwrap();
        let slot = &mut root.children_mut()[0];
        b.deep_copy(inner, slot).unwrap();
        b.set_name(slot, Some("inner")).unwrap();
        root
    }

    #[test]
    fn fuzz_applies_to_nested_objects() {
        let a = wrap(&object(&[("a", 1, false), ("b", 2, false)]));
        let b = wrap(&object(&[("b", 2, false), ("a", 1, false)]));
        assert!(compare_json_trees(&a, &b, CompareFuzz::NoOrder));
        assert!(!compare_json_trees(&a, &b, CompareFuzz::Strict));
    }

    #[test]
    fn const_fields_may_move() {
        let a = object(&[("k", 9, true), ("a", 1, false), ("c", 3, true), ("b", 2, false)]);
        let b = object(&[("a", 1, false), ("c", 3, true), ("b", 2, false), ("k", 9, true)]);
        assert!(compare_json_trees(&a, &b, CompareFuzz::NoConstOrder));

        let swapped = object(&[("b", 2, false), ("c", 3, true), ("a", 1, false), ("k", 9, true)]);
        assert!(!compare_json_trees(&a, &swapped, CompareFuzz::NoConstOrder));
    }

    #[test]
    fn const_and_variable_counts_must_agree() {
        let a = object(&[("c", 1, true), ("d", 2, true), ("n", 3, false)]);
        let b = object(&[("c", 1, true), ("n", 3, false), ("m", 4, false)]);
        assert!(!compare_json_trees(&a, &b, CompareFuzz::NoConstOrder));
    }

    #[test]
    fn duplicate_candidates_are_each_used_once() {
        let a = object(&[("x", 1, false), ("x", 1, false), ("y", 2, false)]);
        let b = object(&[("y", 2, false), ("x", 1, false), ("x", 1, false)]);
        assert!(compare_json_trees(&a, &b, CompareFuzz::NoOrder));

        let c = object(&[("y", 2, false), ("y", 2, false), ("x", 1, false)]);
        assert!(!compare_json_trees(&a, &c, CompareFuzz::NoOrder));
    }

    #[test]
    fn nan_floats_equal_themselves() {
        let mut heap = HeapAllocator::new();
        let mut b = JsonBuilder::new(&mut heap);
        let mut x = JsonNode::new();
        b.set_node(&mut x, &f64::NAN).unwrap();
        let mut y = JsonNode::new();
        b.set_node(&mut y, &f64::NAN).unwrap();
        assert!(compare_json_trees(&x, &y, CompareFuzz::Strict));
    }

    #[test]
    fn names_and_flags_participate() {
        let a = object(&[("a", 1, false)]);
        let b = object(&[("b", 1, false)]);
        let c = object(&[("a", 1, true)]);
        assert!(!compare_json_trees(&a, &b, CompareFuzz::NoOrder));
        assert!(!compare_json_trees(&a, &c, CompareFuzz::NoOrder));
    }
}
