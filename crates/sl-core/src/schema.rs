//! Schema documents: dumping a schema tree as JSON and loading one back.
//!
//! A schema document is one JSON object per node:
//!
//! ```json
//! {"name": "event", "type": "object", "flags": 0, "properties": {
//!     "level": {"type": "integer[]", "flags": 4, "enum": [10, 20, 30]},
//!     "host":  {"type": "string", "flags": 1, "const": "db-1"},
//!     "id":    {"type": "binary", "flags": 2, "len": 16}
//! }}
//! ```
//!
//! `name` appears on the root only; properties are named by their key.
//! Constant nodes carry `const`, enum nodes carry `enum`, fixed-length nodes
//! carry `len`, and any other leaf whose value is not zero or empty carries
//! `value`. Object arrays list their element layouts under `items`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use sl_json::{JsonConsumer, JsonSerializer, JsonValue};
use sl_tree::{
    clear_json_tree, set_flags, BlockAllocator, FlagPolicy, JsonBuilder, JsonNode,
    JsonTreeSizeCalculator, NodeFlags, NodeType, NodeValue,
};
use tracing::debug;

use crate::value::{array_of, string_entries, terminated, FromJson};
use crate::{Error, Result};

/// Name of a node type in schema documents.
pub fn type_name(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Null => "null",
        NodeType::Bool => "boolean",
        NodeType::BoolArray => "bool[]",
        NodeType::Int32 => "integer",
        NodeType::Int32Array => "integer[]",
        NodeType::Uint32 => "uint32",
        NodeType::Uint32Array => "uint32[]",
        NodeType::Int64 => "int64",
        NodeType::Int64Array => "int64[]",
        NodeType::Uint64 => "uint64",
        NodeType::Uint64Array => "uint64[]",
        NodeType::Float64 => "double",
        NodeType::Float64Array => "double[]",
        NodeType::Float32 => "float",
        NodeType::Float32Array => "float[]",
        NodeType::Binary => "binary",
        NodeType::String => "string",
        NodeType::StringArray => "string[]",
        NodeType::Object => "object",
        NodeType::ObjectArray => "object[]",
    }
}

/// Inverse of [`type_name`].
pub fn parse_type_name(name: &str) -> Option<NodeType> {
    NodeType::ALL.into_iter().find(|&t| type_name(t) == name)
}

/// Write the schema document for `root` and finish it.
pub fn serialize_json_schema<C: JsonConsumer>(
    serial: &mut JsonSerializer<C>,
    root: &JsonNode,
) -> Result<()> {
    dump_node(serial, root, true)?;
    serial.finish()?;
    Ok(())
}

fn dump_node<C: JsonConsumer>(
    serial: &mut JsonSerializer<C>,
    node: &JsonNode,
    is_root: bool,
) -> Result<()> {
    serial.open_object()?;
    if is_root {
        if let Some(name) = node.name() {
            serial.write_key("name")?;
            serial.write_str(name.as_bytes())?;
        }
    }
    serial.write_key("type")?;
    serial.write_str(type_name(node.node_type()).as_bytes())?;
    serial.write_key("flags")?;
    serial.write_value(node.flags().bits())?;

    match node.value() {
        NodeValue::Object(properties) => {
            serial.write_key("properties")?;
            serial.open_object()?;
            for property in properties.iter() {
                let name = property.name().ok_or_else(|| {
                    Error::Schema(format!(
                        "a property of '{}' has no name",
                        node.name().unwrap_or("<unnamed>")
                    ))
                })?;
                serial.write_key(name)?;
                dump_node(serial, property, false)?;
            }
            serial.close_object()?;
        }
        NodeValue::ObjectArray(elements) => {
            serial.write_key("items")?;
            serial.open_array()?;
            for element in elements.iter() {
                dump_node(serial, element, false)?;
            }
            serial.close_array()?;
        }
        value => {
            if node.is_const() {
                serial.write_key("const")?;
                dump_value(serial, value)?;
            } else if node.is_enum() {
                serial.write_key("enum")?;
                dump_value(serial, value)?;
            } else {
                if node.is_fixed_length() && !node.node_type().is_scalar() {
                    serial.write_key("len")?;
                    serial.write_value(node.len())?;
                }
                if !is_default_leaf(node) {
                    serial.write_key("value")?;
                    dump_value(serial, value)?;
                }
            }
        }
    }
    serial.close_object()?;
    Ok(())
}

fn dump_value<C: JsonConsumer>(serial: &mut JsonSerializer<C>, value: &NodeValue) -> Result<()> {
    match value {
        NodeValue::Null | NodeValue::Object(_) | NodeValue::ObjectArray(_) => serial.write_null()?,
        NodeValue::Bool(v) => serial.write_value(*v)?,
        NodeValue::Int32(v) => serial.write_value(*v)?,
        NodeValue::Uint32(v) => serial.write_value(*v)?,
        NodeValue::Int64(v) => serial.write_value(*v)?,
        NodeValue::Uint64(v) => serial.write_value(*v)?,
        NodeValue::Float32(v) => serial.write_value(*v)?,
        NodeValue::Float64(v) => serial.write_value(*v)?,
        NodeValue::BoolArray(v) => dump_list(serial, v)?,
        NodeValue::Int32Array(v) => dump_list(serial, v)?,
        NodeValue::Uint32Array(v) => dump_list(serial, v)?,
        NodeValue::Int64Array(v) => dump_list(serial, v)?,
        NodeValue::Uint64Array(v) => dump_list(serial, v)?,
        NodeValue::Float32Array(v) => dump_list(serial, v)?,
        NodeValue::Float64Array(v) => dump_list(serial, v)?,
        NodeValue::Binary(v) => serial.write_base64(v)?,
        NodeValue::String(v) => dump_string(serial, v)?,
        NodeValue::StringArray(entries) => {
            serial.open_array()?;
            for entry in entries.iter() {
                match entry {
                    Some(stored) => dump_string(serial, stored)?,
                    None => serial.write_null()?,
                }
            }
            serial.close_array()?;
        }
    }
    Ok(())
}

fn dump_list<C: JsonConsumer, T: JsonValue + Copy>(
    serial: &mut JsonSerializer<C>,
    values: &[T],
) -> Result<()> {
    serial.open_array()?;
    for &value in values {
        serial.write_value(value)?;
    }
    serial.close_array()?;
    Ok(())
}

// An empty payload is a null string.
fn dump_string<C: JsonConsumer>(serial: &mut JsonSerializer<C>, stored: &[u8]) -> Result<()> {
    match stored.split_last() {
        Some((_, text)) => serial.write_str(text)?,
        None => serial.write_null()?,
    }
    Ok(())
}

/// Whether the loader would rebuild this leaf without a `value` key.
fn is_default_leaf(node: &JsonNode) -> bool {
    let fixed = node.is_fixed_length();
    let zeroed = |all_zero: bool, len: usize| if fixed { all_zero } else { len == 0 };
    match node.value() {
        NodeValue::Null | NodeValue::Object(_) | NodeValue::ObjectArray(_) => true,
        NodeValue::Bool(v) => !*v,
        NodeValue::Int32(v) => *v == 0,
        NodeValue::Uint32(v) => *v == 0,
        NodeValue::Int64(v) => *v == 0,
        NodeValue::Uint64(v) => *v == 0,
        NodeValue::Float32(v) => v.to_bits() == 0,
        NodeValue::Float64(v) => v.to_bits() == 0,
        NodeValue::BoolArray(v) => zeroed(v.iter().all(|b| !b), v.len()),
        NodeValue::Int32Array(v) => zeroed(v.iter().all(|&x| x == 0), v.len()),
        NodeValue::Uint32Array(v) => zeroed(v.iter().all(|&x| x == 0), v.len()),
        NodeValue::Int64Array(v) => zeroed(v.iter().all(|&x| x == 0), v.len()),
        NodeValue::Uint64Array(v) => zeroed(v.iter().all(|&x| x == 0), v.len()),
        NodeValue::Float32Array(v) => zeroed(v.iter().all(|x| x.to_bits() == 0), v.len()),
        NodeValue::Float64Array(v) => zeroed(v.iter().all(|x| x.to_bits() == 0), v.len()),
        NodeValue::Binary(v) | NodeValue::String(v) => zeroed(v.iter().all(|&b| b == 0), v.len()),
        NodeValue::StringArray(v) => zeroed(v.iter().all(Option::is_none), v.len()),
    }
}

/// A parsed schema node, measured and then built in two passes.
#[derive(Debug)]
struct Draft {
    name: Option<String>,
    flags: NodeFlags,
    body: Body,
}

#[derive(Debug)]
enum Body {
    Leaf(NodeValue),
    Object(Vec<Draft>),
    /// Object array elements: each element's flags and properties.
    Rows(Vec<(NodeFlags, Vec<Draft>)>),
}

/// Build a schema tree from a schema document.
///
/// The document is measured first, and every allocation the build makes is
/// admitted against a [`BlockAllocator`] budget of exactly that size, so a
/// build that strays from its measurement fails instead of growing. The
/// nodes themselves own their payloads. Flags go through
/// [`set_flags`] leniently: conflicting combinations are logged and corrected,
/// fatal ones fail the load.
pub fn load_schema(doc: &Value) -> Result<JsonNode> {
    let name = match doc.get("name") {
        None => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(_) => return Err(Error::Schema("$.name: expected a string".into())),
    };
    let draft = parse(doc, name, "$")?;

    let mut calc = JsonTreeSizeCalculator::new();
    measure(&draft, &mut calc);
    let mut block = BlockAllocator::with_capacity(calc.size());
    let mut root = JsonNode::new();
    let built = build(&draft, &mut root, &mut JsonBuilder::new(&mut block));
    if let Err(err) = built {
        clear_json_tree(&mut root, &mut block);
        return Err(err);
    }
    debug!(size = calc.size(), unused = block.remaining(), "loaded schema");
    Ok(root)
}

fn invalid(path: &str, what: impl std::fmt::Display) -> Error {
    Error::Schema(format!("{path}: {what}"))
}

fn parse(doc: &Value, name: Option<String>, path: &str) -> Result<Draft> {
    let obj = doc
        .as_object()
        .ok_or_else(|| invalid(path, "expected a schema object"))?;
    let type_str = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(path, "missing \"type\""))?;
    let node_type =
        parse_type_name(type_str).ok_or_else(|| invalid(path, format!("unknown type \"{type_str}\"")))?;
    let flags = parse_flags(obj, path)?;

    let body = match node_type {
        NodeType::Object => Body::Object(parse_properties(obj, path)?),
        NodeType::ObjectArray => {
            let items = match obj.get("items") {
                None => &[][..],
                Some(items) => items
                    .as_array()
                    .ok_or_else(|| invalid(path, "\"items\" must be an array"))?,
            };
            check_count(items.len(), path)?;
            let mut rows: Vec<(NodeFlags, Vec<Draft>)> = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                let element = parse(item, None, &item_path)?;
                let Body::Object(properties) = element.body else {
                    return Err(invalid(&item_path, "object array elements must be objects"));
                };
                if rows.first().is_some_and(|(_, first)| first.len() != properties.len()) {
                    return Err(invalid(&item_path, "elements must share one property layout"));
                }
                rows.push((element.flags, properties));
            }
            Body::Rows(rows)
        }
        _ => Body::Leaf(parse_leaf(node_type, flags, obj, path)?),
    };
    Ok(Draft { name, flags, body })
}

fn parse_flags(obj: &Map<String, Value>, path: &str) -> Result<NodeFlags> {
    let Some(flags) = obj.get("flags") else {
        return Ok(NodeFlags::NONE);
    };
    let bits = flags
        .as_u64()
        .and_then(|b| u8::try_from(b).ok())
        .ok_or_else(|| invalid(path, "\"flags\" must be an integer from 0 to 255"))?;
    NodeFlags::from_bits(bits).ok_or_else(|| invalid(path, format!("unknown flags {bits:#04x}")))
}

fn parse_properties(obj: &Map<String, Value>, path: &str) -> Result<Vec<Draft>> {
    let Some(properties) = obj.get("properties") else {
        return Ok(Vec::new());
    };
    let properties = properties
        .as_object()
        .ok_or_else(|| invalid(path, "\"properties\" must be an object"))?;
    check_count(properties.len(), path)?;
    properties
        .iter()
        .map(|(key, schema)| parse(schema, Some(key.clone()), &format!("{path}.{key}")))
        .collect()
}

fn check_count(count: usize, path: &str) -> Result<()> {
    if count > usize::from(u16::MAX) {
        return Err(invalid(path, format!("{count} children exceed the 65535 limit")));
    }
    Ok(())
}

fn parse_leaf(
    node_type: NodeType,
    flags: NodeFlags,
    obj: &Map<String, Value>,
    path: &str,
) -> Result<NodeValue> {
    let key = if flags.contains(NodeFlags::CONST) {
        "const"
    } else if flags.contains(NodeFlags::ENUM) {
        "enum"
    } else {
        "value"
    };
    if let Some(given) = obj.get(key) {
        return parse_value(node_type, given).ok_or_else(|| {
            invalid(path, format!("\"{key}\" is not a valid {}", type_name(node_type)))
        });
    }

    let len = match obj.get("len") {
        Some(len) if flags.contains(NodeFlags::FIXED_LENGTH) => len
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| invalid(path, "\"len\" must be an integer from 0 to 65535"))?,
        _ => 0,
    };
    Ok(default_value(node_type, usize::from(len)))
}

fn parse_value(node_type: NodeType, v: &Value) -> Option<NodeValue> {
    fn boxed<T: FromJson>(v: &Value) -> Option<Box<[T]>> {
        array_of(v).map(Vec::into_boxed_slice)
    }

    Some(match node_type {
        NodeType::Null => NodeValue::Null,
        NodeType::Bool => NodeValue::Bool(FromJson::from_json(v)?),
        NodeType::Int32 => NodeValue::Int32(FromJson::from_json(v)?),
        NodeType::Uint32 => NodeValue::Uint32(FromJson::from_json(v)?),
        NodeType::Int64 => NodeValue::Int64(FromJson::from_json(v)?),
        NodeType::Uint64 => NodeValue::Uint64(FromJson::from_json(v)?),
        NodeType::Float32 => NodeValue::Float32(FromJson::from_json(v)?),
        NodeType::Float64 => NodeValue::Float64(FromJson::from_json(v)?),
        NodeType::BoolArray => NodeValue::BoolArray(boxed(v)?),
        NodeType::Int32Array => NodeValue::Int32Array(boxed(v)?),
        NodeType::Uint32Array => NodeValue::Uint32Array(boxed(v)?),
        NodeType::Int64Array => NodeValue::Int64Array(boxed(v)?),
        NodeType::Uint64Array => NodeValue::Uint64Array(boxed(v)?),
        NodeType::Float32Array => NodeValue::Float32Array(boxed(v)?),
        NodeType::Float64Array => NodeValue::Float64Array(boxed(v)?),
        NodeType::Binary => NodeValue::Binary(STANDARD.decode(v.as_str()?).ok()?.into()),
        NodeType::String => match v {
            Value::Null => NodeValue::String(Box::default()),
            _ => NodeValue::String(terminated(v.as_str()?)),
        },
        NodeType::StringArray => NodeValue::StringArray(
            string_entries(v)?
                .into_iter()
                .map(|entry| entry.map(terminated))
                .collect(),
        ),
        NodeType::Object | NodeType::ObjectArray => return None,
    })
}

/// Zero scalars; `len` zeroed entries for arrays, binary, and strings.
fn default_value(node_type: NodeType, len: usize) -> NodeValue {
    match node_type {
        NodeType::Null | NodeType::Object | NodeType::ObjectArray => NodeValue::Null,
        NodeType::Bool => NodeValue::Bool(false),
        NodeType::Int32 => NodeValue::Int32(0),
        NodeType::Uint32 => NodeValue::Uint32(0),
        NodeType::Int64 => NodeValue::Int64(0),
        NodeType::Uint64 => NodeValue::Uint64(0),
        NodeType::Float32 => NodeValue::Float32(0.0),
        NodeType::Float64 => NodeValue::Float64(0.0),
        NodeType::BoolArray => NodeValue::BoolArray(vec![false; len].into()),
        NodeType::Int32Array => NodeValue::Int32Array(vec![0; len].into()),
        NodeType::Uint32Array => NodeValue::Uint32Array(vec![0; len].into()),
        NodeType::Int64Array => NodeValue::Int64Array(vec![0; len].into()),
        NodeType::Uint64Array => NodeValue::Uint64Array(vec![0; len].into()),
        NodeType::Float32Array => NodeValue::Float32Array(vec![0.0; len].into()),
        NodeType::Float64Array => NodeValue::Float64Array(vec![0.0; len].into()),
        NodeType::Binary => NodeValue::Binary(vec![0; len].into()),
        NodeType::String => NodeValue::String(vec![0; len].into()),
        NodeType::StringArray => NodeValue::StringArray(vec![None; len].into()),
    }
}

fn measure(draft: &Draft, calc: &mut JsonTreeSizeCalculator) {
    if let Some(name) = &draft.name {
        calc.track_name(name);
    }
    match &draft.body {
        Body::Leaf(value) => calc.track(value),
        Body::Object(properties) => {
            calc.track_object(properties.len());
            for property in properties {
                measure(property, calc);
            }
        }
        Body::Rows(rows) => {
            let property_count = rows.first().map_or(0, |(_, p)| p.len());
            calc.track_object_array(property_count, rows.len());
            for property in rows.iter().flat_map(|(_, p)| p) {
                measure(property, calc);
            }
        }
    }
}

fn build<A>(draft: &Draft, node: &mut JsonNode, builder: &mut JsonBuilder<'_, A>) -> Result<()>
where
    A: sl_tree::Allocator + ?Sized,
{
    builder.set_name(node, draft.name.as_deref())?;
    match &draft.body {
        Body::Leaf(value) => builder.set_node(node, value)?,
        Body::Object(properties) => {
            builder.create_object(node, narrow(properties.len()))?;
            for (property, slot) in properties.iter().zip(node.children_mut()) {
                build(property, slot, builder)?;
            }
        }
        Body::Rows(rows) => {
            let property_count = rows.first().map_or(0, |(_, p)| p.len());
            builder.create_object_array(node, narrow(property_count), narrow(rows.len()))?;
            for ((flags, properties), element) in rows.iter().zip(node.children_mut()) {
                for (property, slot) in properties.iter().zip(element.children_mut()) {
                    build(property, slot, builder)?;
                }
                if !flags.is_empty() {
                    set_flags(element, *flags, FlagPolicy::Lenient)?;
                }
            }
        }
    }
    if !draft.flags.is_empty() {
        set_flags(node, draft.flags, FlagPolicy::Lenient)?;
    }
    Ok(())
}

// Counts were checked while parsing.
fn narrow(count: usize) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX)
}
