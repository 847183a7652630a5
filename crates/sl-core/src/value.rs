//! Typed reads from `serde_json` values.

use serde_json::Value;

/// A primitive that can be taken from a JSON value.
pub(crate) trait FromJson: Sized {
    fn from_json(value: &Value) -> Option<Self>;
}

impl FromJson for bool {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromJson for i32 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromJson for u32 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| u32::try_from(v).ok())
    }
}

impl FromJson for i64 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromJson for u64 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

// `null` is what the serializer prints for NaN and infinities.
impl FromJson for f32 {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(f32::NAN),
            _ => value.as_f64().map(|v| v as f32),
        }
    }
}

impl FromJson for f64 {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(f64::NAN),
            _ => value.as_f64(),
        }
    }
}

/// Every element of a JSON array as `T`, or `None` if any does not convert.
pub(crate) fn array_of<T: FromJson>(value: &Value) -> Option<Vec<T>> {
    value.as_array()?.iter().map(T::from_json).collect()
}

/// A JSON array of strings and nulls.
pub(crate) fn string_entries(value: &Value) -> Option<Vec<Option<&str>>> {
    value
        .as_array()?
        .iter()
        .map(|entry| match entry {
            Value::Null => Some(None),
            Value::String(s) => Some(Some(s.as_str())),
            _ => None,
        })
        .collect()
}

/// String bytes with the terminator the node model stores.
pub(crate) fn terminated(s: &str) -> Box<[u8]> {
    let mut stored = Vec::with_capacity(s.len() + 1);
    stored.extend_from_slice(s.as_bytes());
    stored.push(0);
    stored.into_boxed_slice()
}
