//! JSON to blob encoding, the inverse of [`crate::transcode`].
//!
//! Fields are written in schema order with the same layout rules the
//! transcoder reads them with: constant fields are skipped, enum fields store
//! the index of the matching choice, and fixed-length fields have no prefix.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use sl_blob::{BlobSink, BlobSizeCalculator, BlobWriter, Primitive};
use sl_tree::{EnumBase, JsonNode, NodeValue};
use tracing::debug;

use crate::schema::type_name;
use crate::value::{array_of, string_entries, FromJson};
use crate::{Error, Result};

/// Write the stored fields of `value` described by `schema` into `sink`.
///
/// Object members are looked up by property name; extra members are ignored
/// and a missing member reads as `null`.
pub fn encode_value<S: BlobSink>(sink: &mut S, schema: &JsonNode, value: &Value) -> Result<()> {
    let node = schema;
    match node.value() {
        NodeValue::Null => {}
        NodeValue::Bool(_) => scalar::<S, bool>(sink, node, value)?,
        NodeValue::Int32(_) => scalar::<S, i32>(sink, node, value)?,
        NodeValue::Uint32(_) => scalar::<S, u32>(sink, node, value)?,
        NodeValue::Int64(_) => scalar::<S, i64>(sink, node, value)?,
        NodeValue::Uint64(_) => scalar::<S, u64>(sink, node, value)?,
        NodeValue::Float32(_) => scalar::<S, f32>(sink, node, value)?,
        NodeValue::Float64(_) => scalar::<S, f64>(sink, node, value)?,
        NodeValue::BoolArray(choices) => array(sink, node, choices, value)?,
        NodeValue::Int32Array(choices) => array(sink, node, choices, value)?,
        NodeValue::Uint32Array(choices) => array(sink, node, choices, value)?,
        NodeValue::Int64Array(choices) => array(sink, node, choices, value)?,
        NodeValue::Uint64Array(choices) => array(sink, node, choices, value)?,
        NodeValue::Float32Array(choices) => array(sink, node, choices, value)?,
        NodeValue::Float64Array(choices) => array(sink, node, choices, value)?,
        NodeValue::Binary(_) if !node.is_const() => {
            let bytes = value
                .as_str()
                .and_then(|text| STANDARD.decode(text).ok())
                .ok_or_else(|| mismatch(node, "a base64 string"))?;
            if node.is_fixed_length() {
                sink.put_fixed(&bytes, node.len())?;
            } else {
                check_len(node, bytes.len())?;
                sink.put_array(&bytes)?;
            }
        }
        NodeValue::String(_) if !node.is_const() => {
            let text = value.as_str().ok_or_else(|| mismatch(node, "a string"))?;
            if node.is_fixed_length() {
                // the last stored byte is the terminator
                let room = usize::from(node.len()).saturating_sub(1);
                if text.len() > room {
                    return Err(Error::encode(
                        &label(node),
                        format!("{} bytes do not fit in a fixed length of {}", text.len(), node.len()),
                    ));
                }
                sink.put_fixed(text.as_bytes(), node.len())?;
            } else {
                sink.put_str(text.as_bytes())?;
            }
        }
        NodeValue::Binary(_) | NodeValue::String(_) => {}
        NodeValue::StringArray(choices) => {
            if node.is_enum() {
                let wanted = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s.as_bytes()),
                    _ => return Err(mismatch(node, "a string or null")),
                };
                let index = choices
                    .iter()
                    .position(|choice| {
                        choice.as_deref().map(|stored| &stored[..stored.len().saturating_sub(1)]) == wanted
                    })
                    .ok_or_else(|| Error::encode(&label(node), "value is not one of the enum choices"))?;
                sink.put(enum_base(node, index)?)?;
            } else if !node.is_const() {
                let entries = string_entries(value)
                    .ok_or_else(|| mismatch(node, "an array of strings and nulls"))?;
                check_len(node, entries.len())?;
                let entries: Vec<Option<&[u8]>> =
                    entries.into_iter().map(|e| e.map(str::as_bytes)).collect();
                sink.put_str_array(&entries)?;
            }
        }
        NodeValue::Object(properties) => {
            let members = value.as_object().ok_or_else(|| mismatch(node, "an object"))?;
            for property in properties.iter() {
                let name = property.name().ok_or_else(|| {
                    Error::encode(&label(node), "a property has no name")
                })?;
                encode_value(sink, property, members.get(name).unwrap_or(&Value::Null))?;
            }
        }
        NodeValue::ObjectArray(elements) => {
            let items = value.as_array().ok_or_else(|| mismatch(node, "an array of objects"))?;
            if node.is_fixed_length() {
                if items.len() != elements.len() {
                    return Err(Error::encode(
                        &label(node),
                        format!("expected exactly {} elements, got {}", elements.len(), items.len()),
                    ));
                }
                for (element, item) in elements.iter().zip(items) {
                    encode_value(sink, element, item)?;
                }
            } else {
                let count = check_len(node, items.len())?;
                sink.put(count)?;
                if count > 0 {
                    let element = elements
                        .first()
                        .ok_or_else(|| Error::MissingElementSchema { node: label(node), count })?;
                    for item in items {
                        encode_value(sink, element, item)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Encode one event: measure it, then write it into an exactly-sized blob.
pub fn encode_blob(schema: &JsonNode, value: &Value) -> Result<Vec<u8>> {
    let mut calc = BlobSizeCalculator::new();
    encode_value(&mut calc, schema, value)?;

    let mut blob = vec![0; calc.size()];
    let mut writer = BlobWriter::validating(&mut blob);
    encode_value(&mut writer, schema, value)?;
    debug_assert_eq!(writer.remaining(), 0);
    debug!(size = blob.len(), "encoded event");
    Ok(blob)
}

fn scalar<S, T>(sink: &mut S, node: &JsonNode, value: &Value) -> Result<()>
where
    S: BlobSink,
    T: Primitive + FromJson,
{
    if node.is_const() {
        return Ok(());
    }
    let v = T::from_json(value).ok_or_else(|| mismatch(node, type_name(node.node_type())))?;
    sink.put(v)?;
    Ok(())
}

fn array<S, T>(sink: &mut S, node: &JsonNode, choices: &[T], value: &Value) -> Result<()>
where
    S: BlobSink,
    T: Primitive + FromJson + PartialEq,
{
    if node.is_enum() {
        let wanted = T::from_json(value).ok_or_else(|| mismatch(node, "one of the enum choices"))?;
        let index = choices
            .iter()
            .position(|&choice| choice == wanted)
            .ok_or_else(|| Error::encode(&label(node), "value is not one of the enum choices"))?;
        sink.put(enum_base(node, index)?)?;
        return Ok(());
    }
    if node.is_const() {
        return Ok(());
    }

    let values = array_of::<T>(value).ok_or_else(|| mismatch(node, type_name(node.node_type())))?;
    if node.is_fixed_length() {
        sink.put_fixed(&values, node.len())?;
    } else {
        check_len(node, values.len())?;
        sink.put_array(&values)?;
    }
    Ok(())
}

fn enum_base(node: &JsonNode, index: usize) -> Result<EnumBase> {
    EnumBase::try_from(index).map_err(|_| Error::encode(&label(node), "enum index does not fit"))
}

/// Stored counts are `u16`.
fn check_len(node: &JsonNode, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        Error::encode(&label(node), format!("{len} elements exceed the 65535 limit"))
    })
}

fn mismatch(node: &JsonNode, expected: &str) -> Error {
    Error::encode(&label(node), format!("expected {expected}"))
}

fn label(node: &JsonNode) -> String {
    node.name().unwrap_or("<unnamed>").to_string()
}
