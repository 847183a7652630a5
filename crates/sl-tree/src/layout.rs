//! Flat node image in the fixed 24-byte node layout.
//!
//! An image is one contiguous buffer holding a whole tree. The root node
//! sits at offset 0 and every pointer field holds a byte offset from the
//! start of the image, 0 meaning null. Integers are little-endian. Scalars
//! live in the data field the way the 64-bit union stores them: 32-bit
//! integers widened to 64 bits, `Float32` widened to `f64`.
//!
//! The image is measured with [`JsonTreeSizeCalculator`] and carved out of a
//! [`BlockAllocator`] of exactly that size, so a written image has no slack.

use std::mem::offset_of;

use sl_blob::Primitive;

use crate::{
    BlockAllocator, JsonNode, JsonTreeSizeCalculator, NodeFlags, NodeType, NodeValue, Result,
    TreeError, NODE_SIZE, POINTER_SIZE,
};

/// Deepest nesting accepted by [`read_image`].
const MAX_DEPTH: usize = 64;

/// One node in the fixed layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawJsonNode {
    pub node_type: u8,
    pub flags: u8,
    pub len: u16,
    pub name_len: u16,
    pub reserved: u16,
    /// Offset of the NUL-terminated name.
    pub name: u64,
    /// Inline scalar, or offset of the node's payload.
    pub data: u64,
}

const _: () = assert!(std::mem::size_of::<RawJsonNode>() == NODE_SIZE);
const _: () = assert!(offset_of!(RawJsonNode, node_type) == 0);
const _: () = assert!(offset_of!(RawJsonNode, flags) == 1);
const _: () = assert!(offset_of!(RawJsonNode, len) == 2);
const _: () = assert!(offset_of!(RawJsonNode, name_len) == 4);
const _: () = assert!(offset_of!(RawJsonNode, name) == 8);
const _: () = assert!(offset_of!(RawJsonNode, data) == 16);

impl RawJsonNode {
    pub fn encode(&self) -> [u8; NODE_SIZE] {
        let mut out = [0u8; NODE_SIZE];
        self.node_type
            .store(&mut out[offset_of!(RawJsonNode, node_type)..]);
        self.flags.store(&mut out[offset_of!(RawJsonNode, flags)..]);
        self.len.store(&mut out[offset_of!(RawJsonNode, len)..]);
        self.name_len
            .store(&mut out[offset_of!(RawJsonNode, name_len)..]);
        self.reserved
            .store(&mut out[offset_of!(RawJsonNode, reserved)..]);
        self.name.store(&mut out[offset_of!(RawJsonNode, name)..]);
        self.data.store(&mut out[offset_of!(RawJsonNode, data)..]);
        out
    }

    pub fn decode(bytes: &[u8; NODE_SIZE]) -> Self {
        Self {
            node_type: u8::load(&bytes[offset_of!(RawJsonNode, node_type)..]),
            flags: u8::load(&bytes[offset_of!(RawJsonNode, flags)..]),
            len: u16::load(&bytes[offset_of!(RawJsonNode, len)..]),
            name_len: u16::load(&bytes[offset_of!(RawJsonNode, name_len)..]),
            reserved: u16::load(&bytes[offset_of!(RawJsonNode, reserved)..]),
            name: u64::load(&bytes[offset_of!(RawJsonNode, name)..]),
            data: u64::load(&bytes[offset_of!(RawJsonNode, data)..]),
        }
    }
}

/// Lay `root` and its subtree out as a flat image.
pub fn write_image(root: &JsonNode) -> Result<Vec<u8>> {
    let mut calc = JsonTreeSizeCalculator::new();
    calc.track_root();
    calc.track_node(root);

    let mut writer = ImageWriter {
        arena: BlockAllocator::with_capacity(calc.size()),
    };
    let at = writer.carve(root, NODE_SIZE)?;
    writer.write_node(root, at)?;
    debug_assert_eq!(writer.arena.remaining(), 0);
    Ok(writer.arena.into_inner())
}

struct ImageWriter {
    arena: BlockAllocator,
}

impl ImageWriter {
    fn carve(&mut self, node: &JsonNode, size: usize) -> Result<usize> {
        self.arena
            .carve(size)
            .map(|range| range.start)
            .ok_or_else(|| TreeError::OutOfMemory {
                node: node.label(),
                requested: size,
            })
    }

    fn put_raw(&mut self, at: usize, raw: &RawJsonNode) {
        self.arena.bytes_mut()[at..at + NODE_SIZE].copy_from_slice(&raw.encode());
    }

    fn put_bytes(&mut self, node: &JsonNode, bytes: &[u8]) -> Result<u64> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let at = self.carve(node, bytes.len())?;
        self.arena.bytes_mut()[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(at as u64)
    }

    fn put_array<T: Primitive>(&mut self, node: &JsonNode, values: &[T]) -> Result<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let size = T::SIZE * values.len();
        let at = self.carve(node, size)?;
        let out = &mut self.arena.bytes_mut()[at..at + size];
        for (value, slot) in values.iter().copied().zip(out.chunks_exact_mut(T::SIZE)) {
            value.store(slot);
        }
        Ok(at as u64)
    }

    fn put_string_array(&mut self, node: &JsonNode, entries: &[Option<Box<[u8]>>]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }
        let table = self.carve(node, POINTER_SIZE * entries.len())?;
        for (i, entry) in entries.iter().enumerate() {
            let offset = match entry {
                Some(s) => self.put_bytes(node, s)?,
                None => 0,
            };
            let slot = table + i * POINTER_SIZE;
            offset.store(&mut self.arena.bytes_mut()[slot..slot + POINTER_SIZE]);
        }
        Ok(table as u64)
    }

    fn write_node(&mut self, node: &JsonNode, at: usize) -> Result<()> {
        let name = match node.name() {
            Some(name) => {
                let at = self.carve(node, name.len() + 1)?;
                let bytes = self.arena.bytes_mut();
                bytes[at..at + name.len()].copy_from_slice(name.as_bytes());
                bytes[at + name.len()] = 0;
                at as u64
            }
            None => 0,
        };

        let data = match node.value() {
            NodeValue::Null => 0,
            NodeValue::Bool(v) => u64::from(*v),
            NodeValue::Int32(v) => i64::from(*v) as u64,
            NodeValue::Uint32(v) => u64::from(*v),
            NodeValue::Int64(v) => *v as u64,
            NodeValue::Uint64(v) => *v,
            NodeValue::Float32(v) => f64::from(*v).to_bits(),
            NodeValue::Float64(v) => v.to_bits(),
            NodeValue::BoolArray(v) => self.put_array(node, v)?,
            NodeValue::Int32Array(v) => self.put_array(node, v)?,
            NodeValue::Uint32Array(v) => self.put_array(node, v)?,
            NodeValue::Int64Array(v) => self.put_array(node, v)?,
            NodeValue::Uint64Array(v) => self.put_array(node, v)?,
            NodeValue::Float32Array(v) => self.put_array(node, v)?,
            NodeValue::Float64Array(v) => self.put_array(node, v)?,
            NodeValue::Binary(v) | NodeValue::String(v) => self.put_bytes(node, v)?,
            NodeValue::StringArray(entries) => self.put_string_array(node, entries)?,
            NodeValue::Object(children) => {
                let base = self.carve(node, NODE_SIZE * children.len())?;
                for (i, child) in children.iter().enumerate() {
                    self.write_node(child, base + i * NODE_SIZE)?;
                }
                base as u64
            }
            NodeValue::ObjectArray(elements) => {
                let properties = elements.first().map_or(0, |e| e.children().len());
                if elements
                    .iter()
                    .any(|e| e.node_type() != NodeType::Object || e.children().len() != properties)
                {
                    return Err(TreeError::InvalidImage(format!(
                        "object array '{}' has elements with different layouts",
                        node.label()
                    )));
                }
                let base = self.carve(node, NODE_SIZE * (properties + 1) * elements.len())?;
                let first_property = base + NODE_SIZE * elements.len();
                for (i, element) in elements.iter().enumerate() {
                    let slice = first_property + i * properties * NODE_SIZE;
                    for (j, property) in element.children().iter().enumerate() {
                        self.write_node(property, slice + j * NODE_SIZE)?;
                    }
                    let header = RawJsonNode {
                        node_type: NodeType::Object as u8,
                        flags: element.flags().bits(),
                        len: element.len(),
                        data: slice as u64,
                        ..RawJsonNode::default()
                    };
                    self.put_raw(base + i * NODE_SIZE, &header);
                }
                base as u64
            }
        };

        let raw = RawJsonNode {
            node_type: node.node_type() as u8,
            flags: node.flags().bits(),
            len: node.len(),
            name_len: node.name_len(),
            reserved: 0,
            name,
            data,
        };
        self.put_raw(at, &raw);
        Ok(())
    }
}

/// Rebuild an owned tree from an image.
///
/// Every offset, length, type tag and flag set is validated; a malformed or
/// cyclic image is rejected rather than followed.
pub fn read_image(image: &[u8]) -> Result<JsonNode> {
    let mut reader = ImageReader {
        image,
        nodes_left: image.len() / NODE_SIZE,
    };
    let root = reader.raw(0)?;
    reader.node(&root, 0)
}

fn invalid(message: impl Into<String>) -> TreeError {
    TreeError::InvalidImage(message.into())
}

fn element_offset(base: u64, index: usize) -> Result<u64> {
    u64::try_from(index * NODE_SIZE)
        .ok()
        .and_then(|step| base.checked_add(step))
        .ok_or_else(|| invalid("node offset overflows"))
}

struct ImageReader<'a> {
    image: &'a [u8],
    /// Each node occupies its own 24 bytes, so a valid image holds at most
    /// `len / 24` of them.
    nodes_left: usize,
}

impl<'a> ImageReader<'a> {
    fn region(&self, offset: u64, size: usize) -> Result<&'a [u8]> {
        let image = self.image;
        usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(size)?))
            .and_then(|range| image.get(range))
            .ok_or_else(|| {
                invalid(format!(
                    "{size} bytes at offset {offset} are outside the {} byte image",
                    image.len()
                ))
            })
    }

    fn pointer(&self, offset: u64, count: usize, width: usize) -> Result<&'a [u8]> {
        if count == 0 {
            return Ok(&[]);
        }
        if offset == 0 {
            return Err(invalid("null pointer to non-empty data"));
        }
        self.region(offset, count * width)
    }

    fn raw(&mut self, offset: u64) -> Result<RawJsonNode> {
        if self.nodes_left == 0 {
            return Err(invalid("more nodes than the image can hold"));
        }
        self.nodes_left -= 1;
        let bytes: &[u8; NODE_SIZE] = self
            .region(offset, NODE_SIZE)?
            .try_into()
            .map_err(|_| invalid("short node"))?;
        Ok(RawJsonNode::decode(bytes))
    }

    fn array<T: Primitive>(&self, raw: &RawJsonNode) -> Result<Box<[T]>> {
        let bytes = self.pointer(raw.data, usize::from(raw.len), T::SIZE)?;
        Ok(bytes.chunks_exact(T::SIZE).map(T::load).collect())
    }

    fn c_string(&self, offset: u64) -> Result<Box<[u8]>> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.image.len())
            .ok_or_else(|| invalid(format!("string offset {offset} is outside the image")))?;
        let rest = &self.image[start..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid(format!("string at offset {offset} is not terminated")))?;
        Ok(rest[..=end].into())
    }

    fn name(&self, raw: &RawJsonNode) -> Result<Option<Box<str>>> {
        if raw.name == 0 {
            return match raw.name_len {
                0 => Ok(None),
                len => Err(invalid(format!("null name with length {len}"))),
            };
        }
        let bytes = self.region(raw.name, usize::from(raw.name_len))?;
        let Some((0, content)) = bytes.split_last() else {
            return Err(invalid(format!("name at offset {} is not terminated", raw.name)));
        };
        let name = std::str::from_utf8(content)
            .map_err(|e| invalid(format!("name at offset {} is not UTF-8: {e}", raw.name)))?;
        Ok(Some(name.into()))
    }

    fn children(&mut self, base: u64, count: usize, depth: usize) -> Result<Box<[JsonNode]>> {
        if count > 0 && base == 0 {
            return Err(invalid("null pointer to child nodes"));
        }
        let mut out = Vec::with_capacity(count.min(self.nodes_left));
        for i in 0..count {
            let raw = self.raw(element_offset(base, i)?)?;
            out.push(self.node(&raw, depth + 1)?);
        }
        Ok(out.into_boxed_slice())
    }

    fn node(&mut self, raw: &RawJsonNode, depth: usize) -> Result<JsonNode> {
        if depth > MAX_DEPTH {
            return Err(invalid(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        let node_type = NodeType::try_from(raw.node_type)
            .map_err(|t| invalid(format!("unknown node type {t}")))?;
        let flags = NodeFlags::from_bits(raw.flags)
            .ok_or_else(|| invalid(format!("unknown flags {:#04x}", raw.flags)))?;
        let name = self.name(raw)?;
        let len = usize::from(raw.len);

        let value = match node_type {
            NodeType::Null => NodeValue::Null,
            NodeType::Bool => NodeValue::Bool(raw.data & 0xff != 0),
            NodeType::Int32 => NodeValue::Int32(raw.data as i64 as i32),
            NodeType::Uint32 => NodeValue::Uint32(raw.data as u32),
            NodeType::Int64 => NodeValue::Int64(raw.data as i64),
            NodeType::Uint64 => NodeValue::Uint64(raw.data),
            NodeType::Float32 => NodeValue::Float32(f64::from_bits(raw.data) as f32),
            NodeType::Float64 => NodeValue::Float64(f64::from_bits(raw.data)),
            NodeType::BoolArray => NodeValue::BoolArray(self.array(raw)?),
            NodeType::Int32Array => NodeValue::Int32Array(self.array(raw)?),
            NodeType::Uint32Array => NodeValue::Uint32Array(self.array(raw)?),
            NodeType::Int64Array => NodeValue::Int64Array(self.array(raw)?),
            NodeType::Uint64Array => NodeValue::Uint64Array(self.array(raw)?),
            NodeType::Float32Array => NodeValue::Float32Array(self.array(raw)?),
            NodeType::Float64Array => NodeValue::Float64Array(self.array(raw)?),
            NodeType::Binary => NodeValue::Binary(self.pointer(raw.data, len, 1)?.into()),
            NodeType::String => {
                let bytes = self.pointer(raw.data, len, 1)?;
                if bytes.last().is_some_and(|&b| b != 0) {
                    return Err(invalid("string value is not terminated"));
                }
                NodeValue::String(bytes.into())
            }
            NodeType::StringArray => {
                let table = self.pointer(raw.data, len, POINTER_SIZE)?;
                let entries = table
                    .chunks_exact(POINTER_SIZE)
                    .map(|slot| match u64::load(slot) {
                        0 => Ok(None),
                        offset => self.c_string(offset).map(Some),
                    })
                    .collect::<Result<Box<[_]>>>()?;
                NodeValue::StringArray(entries)
            }
            NodeType::Object => NodeValue::Object(self.children(raw.data, len, depth)?),
            NodeType::ObjectArray => {
                if len > 0 && raw.data == 0 {
                    return Err(invalid("null pointer to object array elements"));
                }
                let mut elements = Vec::with_capacity(len.min(self.nodes_left));
                let mut layout = None;
                for i in 0..len {
                    let header = self.raw(element_offset(raw.data, i)?)?;
                    if header.node_type != NodeType::Object as u8 {
                        return Err(invalid(format!("object array element {i} is not an object")));
                    }
                    if *layout.get_or_insert(header.len) != header.len {
                        return Err(invalid("object array elements have different layouts"));
                    }
                    let flags = NodeFlags::from_bits(header.flags)
                        .ok_or_else(|| invalid(format!("unknown flags {:#04x}", header.flags)))?;
                    let properties =
                        self.children(header.data, usize::from(header.len), depth + 1)?;
                    elements.push(JsonNode {
                        flags,
                        name: None,
                        value: NodeValue::Object(properties),
                    });
                }
                NodeValue::ObjectArray(elements.into_boxed_slice())
            }
        };

        let node = JsonNode { flags, name, value };
        if node.len() != raw.len {
            return Err(invalid(format!(
                "node '{}' declares length {} but holds {}",
                node.label(),
                raw.len,
                node.len()
            )));
        }
        Ok(node)
    }
}
