//! The JSON serializer state machine.

use std::fmt::{self, Write as _};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use smallvec::SmallVec;

use crate::{ignore_validation_error, JsonConsumer, Result, SerializeError, ValidationHook};

/// Input bytes per base64 fragment; a multiple of 3 so only the last
/// fragment is padded.
const BASE64_CHUNK: usize = 3 * 1024;

const SPACES: [u8; 32] = [b' '; 32];

/// An open JSON container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Array,
    Object,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Array => "array",
            Scope::Object => "object",
        })
    }
}

/// Serializer behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Reject calls that would produce malformed JSON.
    pub validate: bool,
    /// One value per line, indented by scope depth.
    pub pretty_print: bool,
    /// Columns added per open scope when pretty printing.
    pub indent: usize,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            validate: false,
            pretty_print: false,
            indent: 4,
        }
    }
}

impl SerializerOptions {
    pub fn validating() -> Self {
        Self {
            validate: true,
            ..Self::default()
        }
    }

    pub fn pretty(mut self, indent: usize) -> Self {
        self.pretty_print = true;
        self.indent = indent;
        self
    }
}

/// A value that [`JsonSerializer::write_value`] prints as a single token.
pub trait JsonValue {
    fn write_json(&self, out: &mut String);
}

impl JsonValue for bool {
    fn write_json(&self, out: &mut String) {
        out.push_str(if *self { "true" } else { "false" });
    }
}

macro_rules! integer_value {
    ($($ty:ty),*) => {
        $(
            impl JsonValue for $ty {
                fn write_json(&self, out: &mut String) {
                    let _ = write!(out, "{self}");
                }
            }
        )*
    };
}

// 64-bit values are printed in full even though many JSON readers parse
// numbers as doubles.
integer_value!(i8, u8, i16, u16, i32, u32, i64, u64);

macro_rules! float_value {
    ($($ty:ty),*) => {
        $(
            impl JsonValue for $ty {
                /// Shortest text that reads back to the same value. JSON has
                /// no NaN or infinity, so those become `null`.
                fn write_json(&self, out: &mut String) {
                    if self.is_finite() {
                        let _ = write!(out, "{self:?}");
                    } else {
                        out.push_str("null");
                    }
                }
            }
        )*
    };
}

float_value!(f32, f64);

impl<T: JsonValue> JsonValue for Option<T> {
    fn write_json(&self, out: &mut String) {
        match self {
            Some(value) => value.write_json(out),
            None => out.push_str("null"),
        }
    }
}

/// Writes JSON text to a [`JsonConsumer`].
///
/// Scopes are tracked on a small inline stack, so documents up to eight
/// levels deep never allocate for it. With validation off the serializer
/// trusts its caller completely and emits whatever sequence it is given.
pub struct JsonSerializer<C: JsonConsumer> {
    consumer: C,
    options: SerializerOptions,
    on_error: ValidationHook,
    scopes: SmallVec<[Scope; 8]>,
    first_in_scope: bool,
    has_key: bool,
    first_print: bool,
    indent_total: usize,
    scratch: String,
}

impl<C: JsonConsumer> JsonSerializer<C> {
    /// A compact, non-validating serializer.
    pub fn new(consumer: C) -> Self {
        Self::with_options(consumer, SerializerOptions::default())
    }

    pub fn with_options(consumer: C, options: SerializerOptions) -> Self {
        Self {
            consumer,
            options,
            on_error: ignore_validation_error,
            scopes: SmallVec::new(),
            first_in_scope: true,
            has_key: false,
            first_print: true,
            indent_total: 0,
            scratch: String::new(),
        }
    }

    /// Replace the hook that receives validation messages.
    pub fn with_validation_hook(mut self, hook: ValidationHook) -> Self {
        self.on_error = hook;
        self
    }

    pub fn options(&self) -> SerializerOptions {
        self.options
    }

    /// The hook validation messages are sent to, for code that validates on
    /// the serializer's behalf.
    pub fn validation_hook(&self) -> ValidationHook {
        self.on_error
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Forget all state so a new document can be written.
    ///
    /// The consumer is kept as is.
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.first_in_scope = true;
        self.has_key = false;
        self.first_print = true;
        self.indent_total = 0;
    }

    /// Write the key of the next object member.
    pub fn write_key(&mut self, key: &str) -> Result<()> {
        if self.options.validate {
            if self.current() != Some(Scope::Object) {
                return Err(self.report(SerializeError::KeyOutsideObject {
                    key: key.to_owned(),
                    len: key.len(),
                }));
            }
            if self.has_key {
                return Err(self.report(SerializeError::DuplicateKey {
                    key: key.to_owned(),
                    len: key.len(),
                }));
            }
        }

        if !self.first_in_scope {
            self.consumer.consume(b",");
        }
        self.newline();
        self.consumer.consume(b"\"");
        self.escape(key.as_bytes());
        self.consumer.consume(b"\":");
        self.first_in_scope = false;
        self.has_key = true;
        Ok(())
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.write_value(None::<bool>)
    }

    /// Write a boolean, number, or `Option` of one.
    pub fn write_value<V: JsonValue>(&mut self, value: V) -> Result<()> {
        self.value_prologue()?;
        self.value_layout();
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        value.write_json(&mut scratch);
        self.consumer.consume(scratch.as_bytes());
        self.scratch = scratch;
        self.has_key = false;
        Ok(())
    }

    /// Write a string value.
    ///
    /// The bytes are treated as UTF-8. Quote, backslash and control characters
    /// are escaped; each byte that is not part of a valid UTF-8 sequence is
    /// replaced by `\u0000`.
    pub fn write_str(&mut self, value: &[u8]) -> Result<()> {
        self.value_prologue()?;
        self.value_layout();
        self.consumer.consume(b"\"");
        self.escape(value);
        self.consumer.consume(b"\"");
        self.has_key = false;
        Ok(())
    }

    /// Write binary data as a base64 string.
    pub fn write_base64(&mut self, value: &[u8]) -> Result<()> {
        self.value_prologue()?;
        self.value_layout();
        self.consumer.consume(b"\"");
        let mut encoded = String::with_capacity(BASE64_CHUNK / 3 * 4);
        for chunk in value.chunks(BASE64_CHUNK) {
            encoded.clear();
            STANDARD.encode_string(chunk, &mut encoded);
            self.consumer.consume(encoded.as_bytes());
        }
        self.consumer.consume(b"\"");
        self.has_key = false;
        Ok(())
    }

    pub fn open_array(&mut self) -> Result<()> {
        self.open(Scope::Array, b"[")
    }

    pub fn close_array(&mut self) -> Result<()> {
        self.close(Scope::Array, b"]")
    }

    pub fn open_object(&mut self) -> Result<()> {
        self.open(Scope::Object, b"{")
    }

    pub fn close_object(&mut self) -> Result<()> {
        self.close(Scope::Object, b"}")
    }

    /// End the document.
    ///
    /// The trailing newline (when pretty printing) and the terminator are
    /// written even when validation fails because a scope is still open.
    pub fn finish(&mut self) -> Result<()> {
        let result = match self.current() {
            Some(scope) if self.options.validate => {
                Err(self.report(SerializeError::Unfinished(scope)))
            }
            _ => Ok(()),
        };
        if self.options.pretty_print {
            self.consumer.consume(b"\n");
        }
        self.consumer.terminate();
        result
    }

    fn current(&self) -> Option<Scope> {
        self.scopes.last().copied()
    }

    fn report(&self, err: SerializeError) -> SerializeError {
        if self.options.validate {
            (self.on_error)(&err.to_string());
        }
        err
    }

    fn open(&mut self, scope: Scope, token: &[u8]) -> Result<()> {
        self.value_prologue()?;
        self.value_layout();
        self.consumer.consume(token);
        self.first_in_scope = true;
        self.scopes.push(scope);
        if self.options.pretty_print {
            self.indent_total += self.options.indent;
        }
        self.has_key = false;
        Ok(())
    }

    fn close(&mut self, scope: Scope, token: &[u8]) -> Result<()> {
        if self.options.validate {
            if self.current() != Some(scope) {
                return Err(self.report(SerializeError::NotOpen(scope)));
            }
            if scope == Scope::Object && self.has_key {
                return Err(self.report(SerializeError::DanglingKey));
            }
        }
        self.scopes.pop();
        if self.options.pretty_print {
            self.indent_total = self.indent_total.saturating_sub(self.options.indent);
        }
        self.newline();
        self.consumer.consume(token);
        self.first_in_scope = false;
        self.has_key = false;
        Ok(())
    }

    fn value_prologue(&mut self) -> Result<()> {
        if self.options.validate {
            match self.current() {
                None if !self.first_in_scope => {
                    return Err(self.report(SerializeError::MultipleRootValues));
                }
                Some(Scope::Object) if !self.has_key => {
                    return Err(self.report(SerializeError::MissingKey));
                }
                _ => {}
            }
        }
        if self.current() == Some(Scope::Array) && !self.first_in_scope {
            self.consumer.consume(b",");
        }
        self.first_in_scope = false;
        Ok(())
    }

    /// Start a new line at the current indentation.
    fn newline(&mut self) {
        if !self.options.pretty_print {
            return;
        }
        if !self.first_print {
            self.consumer.consume(b"\n");
        }
        self.first_print = false;
        let mut left = self.indent_total;
        while left > 0 {
            let n = left.min(SPACES.len());
            self.consumer.consume(&SPACES[..n]);
            left -= n;
        }
    }

    /// Object members stay on their key's line.
    fn value_layout(&mut self) {
        if !self.options.pretty_print {
            return;
        }
        if self.current() == Some(Scope::Object) {
            self.consumer.consume(b" ");
        } else {
            self.newline();
        }
    }

    fn escape(&mut self, value: &[u8]) {
        for chunk in value.utf8_chunks() {
            let valid = chunk.valid().as_bytes();
            let mut last = 0;
            for (i, &b) in valid.iter().enumerate() {
                let escaped: &[u8] = match b {
                    b'"' => b"\\\"",
                    b'\\' => b"\\\\",
                    0x08 => b"\\b",
                    0x0C => b"\\f",
                    b'\n' => b"\\n",
                    b'\r' => b"\\r",
                    b'\t' => b"\\t",
                    0x00..=0x1F => {
                        self.consumer.consume(&valid[last..i]);
                        self.consumer.consume(&control_escape(b));
                        last = i + 1;
                        continue;
                    }
                    _ => continue,
                };
                self.consumer.consume(&valid[last..i]);
                self.consumer.consume(escaped);
                last = i + 1;
            }
            if last < valid.len() {
                self.consumer.consume(&valid[last..]);
            }
            for _ in chunk.invalid() {
                self.consumer.consume(b"\\u0000");
            }
        }
    }
}

fn control_escape(b: u8) -> [u8; 6] {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    [
        b'\\',
        b'u',
        b'0',
        b'0',
        HEX[usize::from(b >> 4)],
        HEX[usize::from(b & 0x0F)],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn compact() -> JsonSerializer<Vec<u8>> {
        JsonSerializer::with_options(Vec::new(), SerializerOptions::validating())
    }

    fn text(s: JsonSerializer<Vec<u8>>) -> String {
        String::from_utf8(s.into_consumer()).unwrap()
    }

    #[test]
    fn writes_nested_document() {
        let mut s = compact();
        s.open_object().unwrap();
        s.write_key("name").unwrap();
        s.write_str(b"abc").unwrap();
        s.write_key("count").unwrap();
        s.write_value(7u32).unwrap();
        s.write_key("tags").unwrap();
        s.open_array().unwrap();
        s.write_str(b"x").unwrap();
        s.write_null().unwrap();
        s.write_value(true).unwrap();
        s.close_array().unwrap();
        s.close_object().unwrap();
        s.finish().unwrap();
        assert_eq!(text(s), r#"{"name":"abc","count":7,"tags":["x",null,true]}"#);
    }

    #[test]
    fn pretty_prints_with_indent() {
        let mut s = JsonSerializer::with_options(
            Vec::new(),
            SerializerOptions::validating().pretty(2),
        );
        s.open_object().unwrap();
        s.write_key("a").unwrap();
        s.write_value(1i32).unwrap();
        s.write_key("b").unwrap();
        s.open_array().unwrap();
        s.write_value(2i32).unwrap();
        s.write_value(3i32).unwrap();
        s.close_array().unwrap();
        s.close_object().unwrap();
        s.finish().unwrap();
        assert_eq!(text(s), "{\n  \"a\": 1,\n  \"b\": [\n    2,\n    3\n  ]\n}\n");
    }

    #[test]
    fn key_outside_object_is_rejected() {
        let mut s = compact();
        let err = s.write_key("k").unwrap_err();
        assert!(matches!(err, SerializeError::KeyOutsideObject { .. }));
        assert!(text(s).is_empty());
    }

    #[test]
    fn two_keys_in_a_row_are_rejected() {
        let mut s = compact();
        s.open_object().unwrap();
        s.write_key("a").unwrap();
        assert!(matches!(s.write_key("b"), Err(SerializeError::DuplicateKey { .. })));
    }

    #[test]
    fn value_without_key_is_rejected() {
        let mut s = compact();
        s.open_object().unwrap();
        assert_eq!(s.write_value(1i32), Err(SerializeError::MissingKey));
    }

    #[test]
    fn second_root_value_is_rejected() {
        let mut s = compact();
        s.write_value(1i32).unwrap();
        assert_eq!(s.write_value(2i32), Err(SerializeError::MultipleRootValues));
        assert_eq!(text(s), "1");
    }

    #[test]
    fn closing_after_a_key_is_rejected() {
        let mut s = compact();
        s.open_object().unwrap();
        s.write_key("a").unwrap();
        assert_eq!(s.close_object(), Err(SerializeError::DanglingKey));
        assert_eq!(s.depth(), 1);

        s.write_value(1i32).unwrap();
        s.close_object().unwrap();
        s.finish().unwrap();
        assert_eq!(s.into_consumer(), br#"{"a":1}"#);
    }

    #[test]
    fn mismatched_close_is_rejected() {
        let mut s = compact();
        s.open_array().unwrap();
        assert_eq!(s.close_object(), Err(SerializeError::NotOpen(Scope::Object)));
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn unfinished_scope_still_terminates() {
        let mut counter = crate::JsonLengthCounter::new();
        let mut s = JsonSerializer::with_options(&mut counter, SerializerOptions::validating());
        s.open_array().unwrap();
        assert_eq!(s.finish(), Err(SerializeError::Unfinished(Scope::Array)));
        assert_eq!(counter.count(), 2);
    }

    static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_hook(message: &str) {
        assert!(message.contains("global scope"));
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn validation_messages_reach_the_hook() {
        let mut s = compact().with_validation_hook(counting_hook);
        s.write_value(1i32).unwrap();
        let _ = s.write_value(2i32);
        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_validating_mode_trusts_the_caller() {
        let mut s = JsonSerializer::new(Vec::new());
        s.write_value(1i32).unwrap();
        s.write_value(2i32).unwrap();
        s.close_array().unwrap();
        assert_eq!(text(s), "12]");
    }

    #[test]
    fn escapes_strings_and_keys() {
        let mut s = compact();
        s.open_object().unwrap();
        s.write_key("q\"k").unwrap();
        s.write_str(b"a\"b\\c\n\t\x01\x7f\0").unwrap();
        s.close_object().unwrap();
        assert_eq!(
            text(s),
            "{\"q\\\"k\":\"a\\\"b\\\\c\\n\\t\\u0001\x7f\\u0000\"}"
        );
    }

    #[test]
    fn invalid_utf8_bytes_become_nul_escapes() {
        let mut s = compact();
        s.write_str(b"ok\xffhi\xc3").unwrap();
        assert_eq!(text(s), "\"ok\\u0000hi\\u0000\"");
    }

    #[test]
    fn multibyte_text_passes_through() {
        let mut s = compact();
        s.write_str("héllo ☃".as_bytes()).unwrap();
        assert_eq!(text(s), "\"héllo ☃\"");
    }

    #[test]
    fn numbers_print_exactly() {
        let mut s = compact();
        s.open_array().unwrap();
        s.write_value(u64::MAX).unwrap();
        s.write_value(i64::MIN).unwrap();
        s.write_value(0.1f64).unwrap();
        s.write_value(1.5f32).unwrap();
        s.write_value(f64::NAN).unwrap();
        s.write_value(f32::NEG_INFINITY).unwrap();
        s.write_value(Some(3u8)).unwrap();
        s.close_array().unwrap();
        assert_eq!(
            text(s),
            "[18446744073709551615,-9223372036854775808,0.1,1.5,null,null,3]"
        );
    }

    #[test]
    fn base64_values() {
        let mut s = compact();
        s.open_array().unwrap();
        s.write_base64(b"hello").unwrap();
        s.write_base64(b"").unwrap();
        s.close_array().unwrap();
        assert_eq!(text(s), r#"["aGVsbG8=",""]"#);
    }

    #[test]
    fn long_base64_is_chunked_without_inner_padding() {
        let data = vec![0xABu8; BASE64_CHUNK * 2 + 1];
        let mut s = compact();
        s.write_base64(&data).unwrap();
        let out = text(s);
        let body = out.trim_matches('"');
        assert_eq!(body, STANDARD.encode(&data));
    }

    #[test]
    fn reset_allows_a_new_document() {
        let mut s = compact();
        s.open_array().unwrap();
        s.reset();
        s.write_value(false).unwrap();
        s.finish().unwrap();
        assert_eq!(text(s), "[false");
    }

    #[test]
    fn length_counter_matches_output() {
        fn write<C: JsonConsumer>(s: &mut JsonSerializer<C>) {
            s.open_object().unwrap();
            s.write_key("k").unwrap();
            s.write_str(b"v\n").unwrap();
            s.close_object().unwrap();
            s.finish().unwrap();
        }
        let mut counted = JsonSerializer::new(crate::JsonLengthCounter::new());
        write(&mut counted);
        let mut collected = JsonSerializer::new(Vec::new());
        write(&mut collected);
        assert_eq!(
            counted.consumer().count(),
            collected.consumer().len() + 1
        );
    }
}
