//! Shared call shape for the measuring and writing passes.

use crate::{Primitive, Result};

/// Destination for a sequence of blob values.
///
/// Both [`BlobSizeCalculator`](crate::BlobSizeCalculator) and
/// [`BlobWriter`](crate::BlobWriter) implement this, so an encoder written
/// once against `BlobSink` can first measure a blob and then fill it with the
/// exact same sequence of calls.
pub trait BlobSink {
    /// A single aligned primitive.
    fn put<T: Primitive>(&mut self, value: T) -> Result<()>;

    /// A `u16` length prefix followed by the packed elements.
    fn put_array<T: Primitive>(&mut self, values: &[T]) -> Result<()>;

    /// Exactly `fixed_len` elements with no prefix; missing elements are zeroed.
    fn put_fixed<T: Primitive>(&mut self, values: &[T], fixed_len: u16) -> Result<()>;

    /// A length-prefixed string; a terminator is always appended.
    fn put_str(&mut self, s: &[u8]) -> Result<()>;

    /// A count followed by one length-prefixed entry per string.
    ///
    /// `None` entries are stored with a zero length.
    fn put_str_array(&mut self, strings: &[Option<&[u8]>]) -> Result<()>;
}
