//! Aligned binary blob encoding for structured log events.
//!
//! This crate provides:
//! - `BlobSizeCalculator` to measure a blob before it is allocated
//! - `BlobWriter` to fill a buffer of exactly that size
//! - `BlobReader` to read the same sequence of values back
//!
//! The blob carries no type tags. Only length prefixes for variable sized
//! fields are stored, so an external schema (or a fixed call sequence) is
//! needed to decode it. All three types share one alignment rule: every value
//! is placed at an offset that is a multiple of its own size.

pub mod error;
pub mod primitive;
pub mod reader;
pub mod sink;
pub mod size;
pub mod writer;

pub use error::{BlobError, Result};
pub use primitive::{align_offset, Primitive, PrimitiveSlice};
pub use reader::BlobReader;
pub use sink::BlobSink;
pub use size::BlobSizeCalculator;
pub use writer::BlobWriter;

/// Version of the blob layout.
///
/// Code that persists blobs should assert on this value; the layout must not
/// change without bumping it.
pub const BLOB_VERSION: u32 = 0;

/// Largest element count or string length a length prefix can describe.
pub const MAX_BLOB_ARRAY_LEN: usize = u16::MAX as usize;

/// Callback that receives validation messages.
///
/// The blob codec sits underneath the logging system, so it cannot log on its
/// own. Callers that want to see validation failures pass a hook instead.
pub type ValidationHook = fn(&str);

/// Default hook: drops the message.
pub fn ignore_validation_error(_message: &str) {}

/// Clamp an element count to what a `u16` length prefix can hold.
pub(crate) fn clamp_len(len: usize) -> u16 {
    len.min(MAX_BLOB_ARRAY_LEN) as u16
}

/// Stored length of a string (content plus terminator), capped to the prefix range.
pub(crate) fn stored_str_len(content_len: usize) -> u16 {
    clamp_len(content_len.saturating_add(1))
}

/// The part of `s` before its first NUL byte.
pub(crate) fn c_str_content(s: &[u8]) -> &[u8] {
    match s.iter().position(|&b| b == 0) {
        Some(end) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_str_len_counts_terminator() {
        assert_eq!(stored_str_len(0), 1);
        assert_eq!(stored_str_len(3), 4);
        assert_eq!(stored_str_len(MAX_BLOB_ARRAY_LEN + 10), u16::MAX);
    }

    #[test]
    fn c_str_content_stops_at_nul() {
        assert_eq!(c_str_content(b"ab\0cd"), b"ab");
        assert_eq!(c_str_content(b"abc"), b"abc");
        assert_eq!(c_str_content(b""), b"");
    }
}
