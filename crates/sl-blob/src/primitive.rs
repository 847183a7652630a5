//! Fixed-width values that can be stored in a blob.

use std::fmt;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width value with a little-endian blob encoding.
///
/// Implemented for `bool` and the integer and float types up to 64 bits.
pub trait Primitive: Copy + sealed::Sealed {
    /// Encoded width in bytes; also the alignment of the value in a blob.
    const SIZE: usize;

    /// Write the value into the first `SIZE` bytes of `out`.
    fn store(self, out: &mut [u8]);

    /// Read a value from the first `SIZE` bytes of `bytes`.
    fn load(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn store(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn load(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_primitive!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl sealed::Sealed for bool {}

impl Primitive for bool {
    const SIZE: usize = 1;

    #[inline]
    fn store(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    #[inline]
    fn load(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Round `offset` up to the alignment of `T`.
#[inline]
pub fn align_offset<T: Primitive>(offset: usize) -> usize {
    let misalign = offset & (T::SIZE - 1);
    if misalign != 0 {
        offset + (T::SIZE - misalign)
    } else {
        offset
    }
}

/// A typed view over packed primitive values borrowed from a blob.
///
/// Values are decoded on access, so the view works regardless of the actual
/// memory alignment of the underlying bytes.
#[derive(Clone, Copy)]
pub struct PrimitiveSlice<'a, T> {
    bytes: &'a [u8],
    _marker: PhantomData<T>,
}

impl<'a, T: Primitive> PrimitiveSlice<'a, T> {
    /// Wrap `bytes`; any trailing partial element is ignored.
    pub fn new(bytes: &'a [u8]) -> Self {
        let whole = bytes.len() - bytes.len() % T::SIZE;
        Self {
            bytes: &bytes[..whole],
            _marker: PhantomData,
        }
    }

    /// An empty view.
    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.bytes.len() / T::SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Element at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<T> {
        let start = index.checked_mul(T::SIZE)?;
        let end = start.checked_add(T::SIZE)?;
        self.bytes.get(start..end).map(T::load)
    }

    /// Iterate over the decoded elements.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a
    where
        T: 'a,
    {
        self.bytes.chunks_exact(T::SIZE).map(T::load)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// The raw encoded bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl<T: Primitive + fmt::Debug> fmt::Debug for PrimitiveSlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_offset_rounds_up_to_type_size() {
        assert_eq!(align_offset::<u8>(3), 3);
        assert_eq!(align_offset::<u16>(3), 4);
        assert_eq!(align_offset::<u32>(5), 8);
        assert_eq!(align_offset::<u64>(8), 8);
        assert_eq!(align_offset::<f64>(9), 16);
        assert_eq!(align_offset::<bool>(7), 7);
    }

    #[test]
    fn store_load_is_little_endian() {
        let mut buf = [0u8; 4];
        0x0102_0304u32.store(&mut buf);
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(u32::load(&buf), 0x0102_0304);
    }

    #[test]
    fn slice_decodes_elements() {
        let mut buf = [0u8; 12];
        for (i, v) in [-1i32, 7, 300].iter().enumerate() {
            v.store(&mut buf[i * 4..]);
        }
        let view = PrimitiveSlice::<i32>::new(&buf);
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(1), Some(7));
        assert_eq!(view.get(3), None);
        assert_eq!(view.to_vec(), vec![-1, 7, 300]);
    }

    #[test]
    fn slice_ignores_partial_tail() {
        let view = PrimitiveSlice::<u32>::new(&[1, 0, 0, 0, 9, 9]);
        assert_eq!(view.len(), 1);
        assert_eq!(view.as_bytes().len(), 4);
    }
}
