//! Memory accounting for node trees.
//!
//! Node payloads are owned boxes, so an [`Allocator`] does not hand out
//! memory for them. It decides whether each allocation a tree needs is
//! allowed, which is what makes the measure-then-build protocol checkable:
//! a [`BlockAllocator`] sized by a [`JsonTreeSizeCalculator`] admits exactly
//! the requests of the measured tree. The same allocator also backs the
//! flat node image in [`layout`](crate::layout), where its carved ranges are
//! real byte offsets.
//!
//! [`JsonTreeSizeCalculator`]: crate::JsonTreeSizeCalculator

use std::ops::Range;

use thiserror::Error;

/// Alignment of every block carved by a [`BlockAllocator`].
pub const ALIGNMENT: usize = 8;

/// Round `size` up to a multiple of [`ALIGNMENT`].
pub const fn fixup_alignment(size: usize) -> usize {
    let rem = size % ALIGNMENT;
    if rem == 0 {
        size
    } else {
        size + (ALIGNMENT - rem)
    }
}

/// Returned when an allocator cannot satisfy a request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("allocator ran out of memory")]
pub struct AllocError;

/// Admission control for the allocations a node tree makes.
pub trait Allocator {
    /// Request `size` bytes.
    fn alloc(&mut self, size: usize) -> Result<(), AllocError>;

    /// Return `size` bytes from an earlier successful [`alloc`](Self::alloc).
    fn dealloc(&mut self, size: usize);
}

/// General purpose allocator with usage statistics and an optional limit.
#[derive(Debug, Clone, Default)]
pub struct HeapAllocator {
    limit: Option<usize>,
    in_use: usize,
    peak: usize,
    allocations: usize,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An allocator that refuses to hold more than `limit` bytes at once.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Bytes currently allocated.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Largest value `in_use` has reached.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Number of successful allocations.
    pub fn allocation_count(&self) -> usize {
        self.allocations
    }
}

impl Allocator for HeapAllocator {
    fn alloc(&mut self, size: usize) -> Result<(), AllocError> {
        let next = self.in_use.checked_add(size).ok_or(AllocError)?;
        if self.limit.is_some_and(|limit| next > limit) {
            return Err(AllocError);
        }
        self.in_use = next;
        self.peak = self.peak.max(next);
        self.allocations += 1;
        Ok(())
    }

    fn dealloc(&mut self, size: usize) {
        self.in_use = self.in_use.saturating_sub(size);
    }
}

/// Allocates sequentially from one preallocated buffer and never frees.
///
/// Every block starts at a multiple of [`ALIGNMENT`] from the start of the
/// buffer and is rounded up to a multiple of it, the same rounding the size
/// calculator applies. Memory is reclaimed only by dropping the allocator.
#[derive(Debug, Clone, Default)]
pub struct BlockAllocator {
    block: Vec<u8>,
    used: usize,
}

impl BlockAllocator {
    /// Allocate from `block`.
    pub fn new(block: Vec<u8>) -> Self {
        Self { block, used: 0 }
    }

    /// Allocate from a new zeroed buffer of `len` bytes.
    pub fn with_capacity(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Carve the next block of at least `size` bytes.
    ///
    /// Returns the full aligned range, or `None` if the buffer is exhausted.
    pub fn carve(&mut self, size: usize) -> Option<Range<usize>> {
        let size = fixup_alignment(size);
        if size > self.remaining() {
            return None;
        }
        let start = self.used;
        self.used += size;
        Some(start..self.used)
    }

    pub fn capacity(&self) -> usize {
        self.block.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.block.len() - self.used
    }

    /// The whole buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.block
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.block
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.block
    }
}

impl Allocator for BlockAllocator {
    fn alloc(&mut self, size: usize) -> Result<(), AllocError> {
        self.carve(size).map(drop).ok_or(AllocError)
    }

    fn dealloc(&mut self, _size: usize) {}
}
