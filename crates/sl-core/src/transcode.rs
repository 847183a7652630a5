//! Blob to JSON transcoding driven by a schema tree.
//!
//! The schema says what each field is; the blob holds only the values of the
//! non-constant fields, in schema order. Constant fields come from the schema
//! itself and enum fields store a `u16` index into the schema's choices.

use sl_blob::{BlobReader, Primitive};
use sl_json::{JsonConsumer, JsonSerializer, JsonValue};
use sl_tree::{EnumBase, JsonNode, NodeValue};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Emit the JSON for `root`, reading its non-constant data from `reader`.
///
/// The reader advances by exactly the bytes the subtree's stored fields
/// occupy, so calls can be chained over consecutive subtrees. The document
/// is not finished; use [`serialize_blob`] for a complete event.
pub fn serialize_json_tree<C: JsonConsumer>(
    serial: &mut JsonSerializer<C>,
    root: &JsonNode,
    reader: &mut BlobReader<'_>,
) -> Result<()> {
    if let Some(name) = root.name() {
        serial.write_key(name)?;
    }

    match root.value() {
        NodeValue::Null => serial.write_null()?,
        NodeValue::Bool(v) => scalar(serial, root, *v, reader)?,
        NodeValue::Int32(v) => scalar(serial, root, *v, reader)?,
        NodeValue::Uint32(v) => scalar(serial, root, *v, reader)?,
        NodeValue::Int64(v) => scalar(serial, root, *v, reader)?,
        NodeValue::Uint64(v) => scalar(serial, root, *v, reader)?,
        NodeValue::Float32(v) => scalar(serial, root, *v, reader)?,
        NodeValue::Float64(v) => scalar(serial, root, *v, reader)?,
        NodeValue::BoolArray(v) => array(serial, root, v, reader)?,
        NodeValue::Int32Array(v) => array(serial, root, v, reader)?,
        NodeValue::Uint32Array(v) => array(serial, root, v, reader)?,
        NodeValue::Int64Array(v) => array(serial, root, v, reader)?,
        NodeValue::Uint64Array(v) => array(serial, root, v, reader)?,
        NodeValue::Float32Array(v) => array(serial, root, v, reader)?,
        NodeValue::Float64Array(v) => array(serial, root, v, reader)?,
        NodeValue::Binary(v) => {
            let bytes = if root.is_const() {
                &v[..]
            } else if root.is_fixed_length() {
                reader.read_fixed::<u8>(root.len())?.as_bytes()
            } else {
                reader.read_array::<u8>()?.as_bytes()
            };
            serial.write_base64(bytes)?;
        }
        NodeValue::String(v) => {
            let stored = if root.is_const() {
                &v[..]
            } else if root.is_fixed_length() {
                reader.read_fixed_str(root.len())?
            } else {
                reader.read_str()?
            };
            serial.write_str(without_terminator(stored))?;
        }
        NodeValue::StringArray(choices) => {
            if root.is_enum() {
                let index = enum_index(serial, root, reader)?;
                write_entry(serial, choices[index].as_deref())?;
            } else {
                serial.open_array()?;
                if root.is_const() {
                    for entry in choices.iter() {
                        write_entry(serial, entry.as_deref())?;
                    }
                } else {
                    for entry in reader.read_str_array()? {
                        write_entry(serial, entry)?;
                    }
                }
                serial.close_array()?;
            }
        }
        NodeValue::Object(properties) => {
            serial.open_object()?;
            for property in properties.iter() {
                serialize_json_tree(serial, property, reader)?;
            }
            serial.close_object()?;
        }
        NodeValue::ObjectArray(elements) => {
            serial.open_array()?;
            if root.is_fixed_length() {
                for element in elements.iter() {
                    serialize_json_tree(serial, element, reader)?;
                }
            } else {
                let count = reader.read::<u16>()?;
                if count > 0 {
                    // every element shares the first element's layout
                    let element = elements.first().ok_or_else(|| Error::MissingElementSchema {
                        node: label(root),
                        count,
                    })?;
                    for _ in 0..count {
                        serialize_json_tree(serial, element, reader)?;
                    }
                }
            }
            serial.close_array()?;
        }
    }
    Ok(())
}

/// Transcode a whole event blob and finish the document.
///
/// The blob is read with bounds checks either way. With a validating
/// serializer the reader also validates and reports through the serializer's
/// hook.
pub fn serialize_blob<C: JsonConsumer>(
    serial: &mut JsonSerializer<C>,
    schema: &JsonNode,
    blob: &[u8],
) -> Result<()> {
    let mut reader = if serial.options().validate {
        BlobReader::validating(blob).with_validation_hook(serial.validation_hook())
    } else {
        BlobReader::new(blob)
    };
    serialize_json_tree(serial, schema, &mut reader)?;
    debug!(
        blob_len = blob.len(),
        unread = reader.remaining(),
        "transcoded event"
    );
    serial.finish()?;
    Ok(())
}

fn scalar<C, T>(
    serial: &mut JsonSerializer<C>,
    node: &JsonNode,
    value: T,
    reader: &mut BlobReader<'_>,
) -> Result<()>
where
    C: JsonConsumer,
    T: Primitive + JsonValue,
{
    let value = if node.is_const() { value } else { reader.read::<T>()? };
    serial.write_value(value)?;
    Ok(())
}

fn array<C, T>(
    serial: &mut JsonSerializer<C>,
    node: &JsonNode,
    choices: &[T],
    reader: &mut BlobReader<'_>,
) -> Result<()>
where
    C: JsonConsumer,
    T: Primitive + JsonValue,
{
    if node.is_enum() {
        let index = enum_index(serial, node, reader)?;
        serial.write_value(choices[index])?;
        return Ok(());
    }

    serial.open_array()?;
    if node.is_const() {
        for &value in choices {
            serial.write_value(value)?;
        }
    } else {
        let stored = if node.is_fixed_length() {
            reader.read_fixed::<T>(node.len())?
        } else {
            reader.read_array::<T>()?
        };
        for value in stored.iter() {
            serial.write_value(value)?;
        }
    }
    serial.close_array()?;
    Ok(())
}

/// Read an enum index and check it against the node's choices.
///
/// An out of range index is always reported to the serializer's hook.
fn enum_index<C: JsonConsumer>(
    serial: &JsonSerializer<C>,
    node: &JsonNode,
    reader: &mut BlobReader<'_>,
) -> Result<usize> {
    let index = reader.read::<EnumBase>()?;
    trace!(node = %label(node), index, "enum field");
    if index >= node.len() {
        let err = Error::EnumOutOfRange {
            node: label(node),
            index,
            len: node.len(),
        };
        (serial.validation_hook())(&err.to_string());
        return Err(err);
    }
    Ok(usize::from(index))
}

fn write_entry<C: JsonConsumer>(serial: &mut JsonSerializer<C>, entry: Option<&[u8]>) -> Result<()> {
    match entry {
        Some(stored) => serial.write_str(without_terminator(stored))?,
        None => serial.write_null()?,
    }
    Ok(())
}

/// Stored strings count their terminator; the text is everything before it.
fn without_terminator(stored: &[u8]) -> &[u8] {
    &stored[..stored.len().saturating_sub(1)]
}

fn label(node: &JsonNode) -> String {
    node.name().unwrap_or("<unnamed>").to_string()
}
