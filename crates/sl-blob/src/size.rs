//! Blob size measurement.

use crate::primitive::align_offset;
use crate::{c_str_content, clamp_len, stored_str_len, BlobError, BlobSink, Primitive, Result};

/// Calculates the number of bytes a blob needs.
///
/// Track every value that will be written, in write order; the result of
/// [`size`](Self::size) is then exactly the buffer length the matching
/// [`BlobWriter`](crate::BlobWriter) calls consume. Only types and lengths
/// matter, never the values themselves.
#[derive(Debug, Clone, Default)]
pub struct BlobSizeCalculator {
    size: usize,
}

impl BlobSizeCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracked blob size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Track a primitive.
    pub fn track<T: Primitive>(&mut self, _value: T) {
        self.track_scalar::<T>();
    }

    fn track_scalar<T: Primitive>(&mut self) {
        self.size = align_offset::<T>(self.size) + T::SIZE;
    }

    /// Track a length-prefixed array.
    pub fn track_array<T: Primitive>(&mut self, values: &[T]) {
        self.track_array_len::<T>(clamp_len(values.len()));
    }

    /// Track a length-prefixed array of `len` elements.
    pub fn track_array_len<T: Primitive>(&mut self, len: u16) {
        self.track_scalar::<u16>();
        if len > 0 {
            self.size = align_offset::<T>(self.size) + T::SIZE * usize::from(len);
        }
    }

    /// Track a string view; the stored form gains a terminator.
    pub fn track_str(&mut self, s: &[u8]) {
        self.track_scalar::<u16>();
        self.size += usize::from(stored_str_len(s.len()));
    }

    /// Track an array of optional C strings.
    ///
    /// Each string ends at its first NUL byte, like its written form.
    pub fn track_str_array(&mut self, strings: &[Option<&[u8]>]) {
        let count = usize::from(clamp_len(strings.len()));
        self.track_scalar::<u16>();
        for s in &strings[..count] {
            self.track_scalar::<u16>();
            if let Some(s) = s {
                self.size += usize::from(stored_str_len(c_str_content(s).len()));
            }
        }
    }

    /// Track an array of strings whose stored lengths are already known.
    ///
    /// Each length includes the terminator; zero marks a missing string.
    pub fn track_str_array_with_lengths(&mut self, lengths: &[u16]) {
        let count = usize::from(clamp_len(lengths.len()));
        self.track_scalar::<u16>();
        for &len in &lengths[..count] {
            self.track_scalar::<u16>();
            self.size += usize::from(len);
        }
    }

    /// Track a fixed length array; no length prefix is stored.
    pub fn track_fixed<T: Primitive>(&mut self, fixed_len: u16) {
        self.size = align_offset::<T>(self.size) + T::SIZE * usize::from(fixed_len);
    }
}

impl BlobSink for BlobSizeCalculator {
    fn put<T: Primitive>(&mut self, value: T) -> Result<()> {
        self.track(value);
        Ok(())
    }

    fn put_array<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        self.track_array(values);
        Ok(())
    }

    fn put_fixed<T: Primitive>(&mut self, values: &[T], fixed_len: u16) -> Result<()> {
        if values.len() > usize::from(fixed_len) {
            return Err(BlobError::FixedLengthExceeded {
                actual: values.len(),
                fixed: fixed_len,
            });
        }
        self.track_fixed::<T>(fixed_len);
        Ok(())
    }

    fn put_str(&mut self, s: &[u8]) -> Result<()> {
        self.track_str(s);
        Ok(())
    }

    fn put_str_array(&mut self, strings: &[Option<&[u8]>]) -> Result<()> {
        self.track_str_array(strings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_padded_to_their_size() {
        let mut calc = BlobSizeCalculator::new();
        calc.track(true);
        calc.track(1u32);
        calc.track(2u8);
        calc.track(3u64);
        // 1 + pad 3 + 4 + 1 + pad 7 + 8
        assert_eq!(calc.size(), 24);
    }

    #[test]
    fn empty_array_keeps_its_prefix() {
        let mut calc = BlobSizeCalculator::new();
        calc.track_array::<f64>(&[]);
        assert_eq!(calc.size(), 2);
    }

    #[test]
    fn array_elements_are_aligned_after_prefix() {
        let mut calc = BlobSizeCalculator::new();
        calc.track_array(&[1.0f64, 2.0]);
        assert_eq!(calc.size(), 8 + 16);
    }

    #[test]
    fn strings_count_their_terminator() {
        let mut calc = BlobSizeCalculator::new();
        calc.track_str(b"abc");
        assert_eq!(calc.size(), 2 + 4);
    }

    #[test]
    fn string_array_skips_missing_entries() {
        let mut calc = BlobSizeCalculator::new();
        calc.track_str_array(&[Some(b"x".as_slice()), None, Some(b"yz".as_slice())]);
        // count(2) + [2 + 2] + [2] + [2 + 3] = 13
        assert_eq!(calc.size(), 13);

        let mut with_lengths = BlobSizeCalculator::new();
        with_lengths.track_str_array_with_lengths(&[2, 0, 3]);
        assert_eq!(with_lengths.size(), calc.size());
    }

    #[test]
    fn oversized_string_arrays_are_clamped() {
        use crate::MAX_BLOB_ARRAY_LEN;

        let strings = vec![Some(b"ab".as_slice()); MAX_BLOB_ARRAY_LEN + 3];
        let lengths = vec![3u16; MAX_BLOB_ARRAY_LEN + 3];

        let mut calc = BlobSizeCalculator::new();
        calc.track_str_array(&strings);
        let mut with_lengths = BlobSizeCalculator::new();
        with_lengths.track_str_array_with_lengths(&lengths);
        assert_eq!(with_lengths.size(), calc.size());

        let mut blob = vec![0; calc.size()];
        let mut writer = crate::BlobWriter::validating(&mut blob);
        writer.copy_str_array_with_lengths(&strings, &lengths).unwrap();
        assert_eq!(writer.remaining(), 0);
    }

    #[test]
    fn fixed_arrays_have_no_prefix() {
        let mut calc = BlobSizeCalculator::new();
        calc.track(1u8);
        calc.track_fixed::<u32>(3);
        assert_eq!(calc.size(), 4 + 12);
    }

    #[test]
    fn fixed_overflow_is_rejected() {
        let mut calc = BlobSizeCalculator::new();
        let err = calc.put_fixed(&[1u8, 2, 3], 2).unwrap_err();
        assert_eq!(err, BlobError::FixedLengthExceeded { actual: 3, fixed: 2 });
    }
}
