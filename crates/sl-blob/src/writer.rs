//! Blob writer.

use crate::primitive::align_offset;
use crate::{
    c_str_content, clamp_len, ignore_validation_error, stored_str_len, BlobError, BlobSink,
    Primitive, Result, ValidationHook, BLOB_VERSION,
};

/// Writes values into a caller supplied buffer.
///
/// The buffer should be exactly as long as a [`BlobSizeCalculator`] reported
/// for the same call sequence. Writes never touch memory outside the buffer;
/// running out of space returns [`BlobError::WriteOverrun`].
///
/// A validating writer additionally zeroes alignment padding and forwards
/// every error message to its validation hook.
///
/// [`BlobSizeCalculator`]: crate::BlobSizeCalculator
pub struct BlobWriter<'a> {
    buffer: &'a mut [u8],
    written: usize,
    validate: bool,
    on_error: ValidationHook,
}

impl<'a> BlobWriter<'a> {
    /// Version of the blob layout this writer produces.
    pub const VERSION: u32 = BLOB_VERSION;

    /// A non-validating writer over `buffer`.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            written: 0,
            validate: false,
            on_error: ignore_validation_error,
        }
    }

    /// A validating writer over `buffer`.
    pub fn validating(buffer: &'a mut [u8]) -> Self {
        Self {
            validate: true,
            ..Self::new(buffer)
        }
    }

    /// Replace the hook that receives validation messages.
    pub fn with_validation_hook(mut self, hook: ValidationHook) -> Self {
        self.on_error = hook;
        self
    }

    /// Bytes consumed so far, including padding.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Bytes left in the buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.written)
    }

    /// Write one primitive.
    pub fn copy<T: Primitive>(&mut self, value: T) -> Result<()> {
        self.align::<T>();
        let at = self.reserve(T::SIZE)?;
        value.store(&mut self.buffer[at..]);
        Ok(())
    }

    /// Write a `u16` element count followed by the packed elements.
    ///
    /// Arrays longer than `u16::MAX` elements are truncated.
    pub fn copy_array<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        let len = clamp_len(values.len());
        self.copy(len)?;
        if len == 0 {
            return Ok(());
        }
        self.align::<T>();
        let total = T::SIZE * usize::from(len);
        let at = self.reserve(total)?;
        for (value, slot) in values
            .iter()
            .zip(self.buffer[at..at + total].chunks_exact_mut(T::SIZE))
        {
            value.store(slot);
        }
        Ok(())
    }

    /// Write a string view as a length-prefixed, terminated string.
    ///
    /// The view may contain NUL bytes; they are kept. A terminator is always
    /// appended, whether or not the view already ends in one.
    pub fn copy_str(&mut self, s: &[u8]) -> Result<()> {
        let len = stored_str_len(s.len());
        self.copy(len)?;
        let at = self.reserve(usize::from(len))?;
        let content = usize::from(len) - 1;
        self.buffer[at..at + content].copy_from_slice(&s[..content]);
        self.buffer[at + content] = 0;
        Ok(())
    }

    /// Write an array of optional C strings.
    ///
    /// Each string ends at its first NUL byte. Strings longer than the prefix
    /// range are truncated but still terminated.
    pub fn copy_str_array(&mut self, strings: &[Option<&[u8]>]) -> Result<()> {
        let count = clamp_len(strings.len());
        self.copy(count)?;
        for s in &strings[..usize::from(count)] {
            match s {
                None => self.copy(0u16)?,
                Some(s) => {
                    let content = c_str_content(s);
                    let len = stored_str_len(content.len());
                    self.write_terminated(&content[..usize::from(len) - 1], len)?;
                }
            }
        }
        Ok(())
    }

    /// Write an array of strings using stored lengths computed by the caller.
    ///
    /// `lengths[i]` includes the terminator; zero writes a missing entry. This
    /// avoids scanning every string twice when the lengths were already needed
    /// to size the blob.
    pub fn copy_str_array_with_lengths(
        &mut self,
        strings: &[Option<&[u8]>],
        lengths: &[u16],
    ) -> Result<()> {
        if strings.len() != lengths.len() {
            return Err(self.report(BlobError::CountMismatch {
                strings: strings.len(),
                lengths: lengths.len(),
            }));
        }
        let count = clamp_len(strings.len());
        self.copy(count)?;
        let entries = strings.iter().zip(lengths).take(usize::from(count));
        for (index, (s, &declared)) in entries.enumerate() {
            if declared == 0 {
                self.copy(0u16)?;
                continue;
            }
            let content = usize::from(declared) - 1;
            match s {
                Some(s) if s.len() >= content => {
                    self.write_terminated(&s[..content], declared)?;
                }
                _ => {
                    return Err(self.report(BlobError::LengthMismatch {
                        index,
                        available: s.map_or(0, <[u8]>::len),
                        declared,
                    }));
                }
            }
        }
        Ok(())
    }

    /// Write exactly `fixed_len` elements with no length prefix.
    ///
    /// Slots past `values.len()` are zero filled.
    pub fn copy_fixed<T: Primitive>(&mut self, values: &[T], fixed_len: u16) -> Result<()> {
        if values.len() > usize::from(fixed_len) {
            return Err(self.report(BlobError::FixedLengthExceeded {
                actual: values.len(),
                fixed: fixed_len,
            }));
        }
        self.align::<T>();
        let total = T::SIZE * usize::from(fixed_len);
        let at = self.reserve(total)?;
        let region = &mut self.buffer[at..at + total];
        let (filled, padding) = region.split_at_mut(T::SIZE * values.len());
        for (value, slot) in values.iter().zip(filled.chunks_exact_mut(T::SIZE)) {
            value.store(slot);
        }
        padding.fill(0);
        Ok(())
    }

    /// Advance to the next offset aligned for `T`.
    pub fn align<T: Primitive>(&mut self) {
        let next = align_offset::<T>(self.written);
        if self.validate {
            let end = next.min(self.buffer.len());
            if self.written < end {
                self.buffer[self.written..end].fill(0);
            }
        }
        self.written = next;
    }

    fn write_terminated(&mut self, content: &[u8], len: u16) -> Result<()> {
        self.align::<u16>();
        let at = self.reserve(2 + usize::from(len))?;
        len.store(&mut self.buffer[at..]);
        let body = at + 2;
        self.buffer[body..body + content.len()].copy_from_slice(content);
        self.buffer[body + content.len()] = 0;
        Ok(())
    }

    /// Claim `size` bytes at the current offset.
    fn reserve(&mut self, size: usize) -> Result<usize> {
        let at = self.written;
        match at.checked_add(size) {
            Some(end) if end <= self.buffer.len() => {
                self.written = end;
                Ok(at)
            }
            _ => Err(self.report(BlobError::WriteOverrun {
                requested: size,
                available: self.remaining(),
            })),
        }
    }

    fn report(&self, err: BlobError) -> BlobError {
        if self.validate {
            (self.on_error)(&err.to_string());
        }
        err
    }
}

impl BlobSink for BlobWriter<'_> {
    fn put<T: Primitive>(&mut self, value: T) -> Result<()> {
        self.copy(value)
    }

    fn put_array<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        self.copy_array(values)
    }

    fn put_fixed<T: Primitive>(&mut self, values: &[T], fixed_len: u16) -> Result<()> {
        self.copy_fixed(values, fixed_len)
    }

    fn put_str(&mut self, s: &[u8]) -> Result<()> {
        self.copy_str(s)
    }

    fn put_str_array(&mut self, strings: &[Option<&[u8]>]) -> Result<()> {
        self.copy_str_array(strings)
    }
}
