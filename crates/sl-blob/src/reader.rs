//! Blob reader.

use crate::primitive::align_offset;
use crate::{
    ignore_validation_error, BlobError, Primitive, PrimitiveSlice, Result, ValidationHook,
    BLOB_VERSION,
};

/// Reads values back out of a blob produced by [`BlobWriter`](crate::BlobWriter).
///
/// Reads must follow the same sequence as the writes that produced the blob.
/// Arrays and strings are returned as views borrowing from the blob. Every
/// read is bounds checked; a validating reader also forwards error messages
/// to its hook.
pub struct BlobReader<'a> {
    buffer: &'a [u8],
    read: usize,
    validate: bool,
    on_error: ValidationHook,
}

impl<'a> BlobReader<'a> {
    /// Version of the blob layout this reader understands.
    pub const VERSION: u32 = BLOB_VERSION;

    /// A non-validating reader over `blob`.
    pub fn new(blob: &'a [u8]) -> Self {
        Self {
            buffer: blob,
            read: 0,
            validate: false,
            on_error: ignore_validation_error,
        }
    }

    /// A validating reader over `blob`.
    pub fn validating(blob: &'a [u8]) -> Self {
        Self {
            validate: true,
            ..Self::new(blob)
        }
    }

    /// Replace the hook that receives validation messages.
    pub fn with_validation_hook(mut self, hook: ValidationHook) -> Self {
        self.on_error = hook;
        self
    }

    pub fn is_validating(&self) -> bool {
        self.validate
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.read
    }

    /// Bytes left after the current offset.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read)
    }

    /// Read one primitive.
    pub fn read<T: Primitive>(&mut self) -> Result<T> {
        self.align::<T>();
        self.take(T::SIZE).map(T::load)
    }

    /// Read a length-prefixed array.
    pub fn read_array<T: Primitive>(&mut self) -> Result<PrimitiveSlice<'a, T>> {
        let len = self.read::<u16>()?;
        if len == 0 {
            return Ok(PrimitiveSlice::empty());
        }
        self.align::<T>();
        self.take(T::SIZE * usize::from(len))
            .map(PrimitiveSlice::new)
    }

    /// Read an array of exactly `fixed_len` elements with no prefix.
    pub fn read_fixed<T: Primitive>(&mut self, fixed_len: u16) -> Result<PrimitiveSlice<'a, T>> {
        self.align::<T>();
        self.take(T::SIZE * usize::from(fixed_len))
            .map(PrimitiveSlice::new)
    }

    /// Read a length-prefixed string.
    ///
    /// The returned bytes include the stored terminator.
    pub fn read_str(&mut self) -> Result<&'a [u8]> {
        self.read_array::<u8>().map(|s| s.as_bytes())
    }

    /// Read a fixed length string of `fixed_len` bytes.
    pub fn read_fixed_str(&mut self, fixed_len: u16) -> Result<&'a [u8]> {
        self.read_fixed::<u8>(fixed_len).map(|s| s.as_bytes())
    }

    /// Read an array of optional strings into a new vector.
    ///
    /// Entries stored with a zero length come back as `None`; the others
    /// include their terminator. The vector's initial capacity is bounded by
    /// the bytes left in the blob, so a corrupt count cannot force a large
    /// allocation.
    pub fn read_str_array(&mut self) -> Result<Vec<Option<&'a [u8]>>> {
        let count = usize::from(self.read::<u16>()?);
        let mut out = Vec::with_capacity(count.min(self.remaining() / 2));
        for _ in 0..count {
            out.push(self.read_str_entry()?);
        }
        Ok(out)
    }

    /// Read an array of optional strings into `out`.
    ///
    /// Returns the number of entries read. Fails without consuming anything
    /// when `out` is shorter than the stored count.
    pub fn read_str_array_into(&mut self, out: &mut [Option<&'a [u8]>]) -> Result<usize> {
        let start = self.read;
        let count = usize::from(self.read::<u16>()?);
        if count > out.len() {
            self.read = start;
            return Err(self.report(BlobError::BufferTooSmall {
                capacity: out.len(),
                needed: count,
            }));
        }
        for slot in &mut out[..count] {
            *slot = self.read_str_entry()?;
        }
        Ok(count)
    }

    /// Advance to the next offset aligned for `T`.
    pub fn align<T: Primitive>(&mut self) {
        self.read = align_offset::<T>(self.read);
    }

    fn read_str_entry(&mut self) -> Result<Option<&'a [u8]>> {
        let len = self.read::<u16>()?;
        if len == 0 {
            return Ok(None);
        }
        self.take(usize::from(len)).map(Some)
    }

    fn take(&mut self, size: usize) -> Result<&'a [u8]> {
        let at = self.read;
        match at.checked_add(size) {
            Some(end) if end <= self.buffer.len() => {
                self.read = end;
                Ok(&self.buffer[at..end])
            }
            _ => Err(self.report(BlobError::ReadOverrun {
                requested: size,
                available: self.remaining(),
            })),
        }
    }

    /// Forward `err` to the hook when validating and hand it back.
    pub fn report(&self, err: BlobError) -> BlobError {
        if self.validate {
            (self.on_error)(&err.to_string());
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlobSink, BlobSizeCalculator, BlobWriter};

    fn write_sample<S: BlobSink>(sink: &mut S) {
        sink.put(true).unwrap();
        sink.put(-5i64).unwrap();
        sink.put_array(&[1.5f32, -2.25]).unwrap();
        sink.put_str(b"hello").unwrap();
        sink.put_str_array(&[Some(b"a".as_slice()), None]).unwrap();
        sink.put_fixed(&[9u32], 2).unwrap();
    }

    #[test]
    fn reads_back_what_was_written() {
        let mut calc = BlobSizeCalculator::new();
        write_sample(&mut calc);
        let mut buf = vec![0u8; calc.size()];
        let mut writer = BlobWriter::validating(&mut buf);
        write_sample(&mut writer);
        assert_eq!(writer.remaining(), 0);

        let mut reader = BlobReader::validating(&buf);
        assert!(reader.read::<bool>().unwrap());
        assert_eq!(reader.read::<i64>().unwrap(), -5);
        assert_eq!(reader.read_array::<f32>().unwrap().to_vec(), vec![1.5, -2.25]);
        assert_eq!(reader.read_str().unwrap(), b"hello\0");
        assert_eq!(
            reader.read_str_array().unwrap(),
            vec![Some(b"a\0".as_slice()), None]
        );
        assert_eq!(reader.read_fixed::<u32>(2).unwrap().to_vec(), vec![9, 0]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn empty_blob_underruns() {
        let mut reader = BlobReader::validating(&[]);
        let err = reader.read::<u32>().unwrap_err();
        assert_eq!(
            err,
            BlobError::ReadOverrun {
                requested: 4,
                available: 0
            }
        );
    }

    #[test]
    fn fixed_read_checks_full_element_width() {
        let blob = [0u8; 6];
        let mut reader = BlobReader::new(&blob);
        assert!(reader.read_fixed::<u32>(2).is_err());
    }

    #[test]
    fn corrupt_string_count_is_bounded() {
        // claims 65535 entries but holds none
        let blob = [0xFF, 0xFF];
        let mut reader = BlobReader::validating(&blob);
        assert!(matches!(
            reader.read_str_array(),
            Err(BlobError::ReadOverrun { .. })
        ));
    }

    #[test]
    fn string_array_into_rejects_short_output() {
        let mut buf = vec![0u8; 16];
        let mut writer = BlobWriter::new(&mut buf);
        writer
            .copy_str_array(&[Some(b"x".as_slice()), Some(b"y".as_slice())])
            .unwrap();

        let mut reader = BlobReader::validating(&buf);
        let mut one = [None; 1];
        let err = reader.read_str_array_into(&mut one).unwrap_err();
        assert_eq!(
            err,
            BlobError::BufferTooSmall {
                capacity: 1,
                needed: 2
            }
        );
        assert_eq!(reader.position(), 0);

        let mut two = [None; 2];
        assert_eq!(reader.read_str_array_into(&mut two).unwrap(), 2);
        assert_eq!(two[1], Some(b"y\0".as_slice()));
    }
}
