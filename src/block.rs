// Pooled block storage and chain positions.

use std::cell::UnsafeCell;
use std::ptr;
use std::slice;
use std::sync::Arc;

/// Shared handle to a pooled block.
///
/// The chain, an in-flight write reservation, and the pool free list may
/// each hold one. A block is only recycled once its handle is unique again,
/// so a late writer can never alias a re-leased block.
pub type BlockHandle = Arc<Block>;

/// A fixed-capacity byte block leased from a [`BlockPool`](crate::BlockPool).
///
/// Storage is interior-mutable: the producer fills the spare region at the
/// tail outside the chain lock while the consumer copies committed bytes out
/// under it. The two ranges never overlap; all range bookkeeping (`start`,
/// `end`, forward links) lives in the channel's locked chain state, never in
/// the block itself.
#[derive(Debug)]
pub struct Block {
    storage: UnsafeCell<Box<[u8]>>,
    capacity: usize,
}

// Safety: all access goes through the unsafe range helpers below, whose
// callers (the channel and the write reservation) guarantee that concurrent
// accesses target disjoint byte ranges.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    /// Allocate a zero-filled block of the given capacity.
    pub fn with_capacity(capacity: usize) -> BlockHandle {
        Arc::new(Self {
            storage: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            capacity,
        })
    }

    /// Total byte capacity of the block.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy `src` into the block starting at `at`.
    ///
    /// # Safety
    /// `at + src.len()` must be within capacity and no other thread may
    /// concurrently access the target range.
    pub(crate) unsafe fn copy_in(&self, at: usize, src: &[u8]) {
        debug_assert!(at + src.len() <= self.capacity);
        let base = (*self.storage.get()).as_mut_ptr();
        ptr::copy_nonoverlapping(src.as_ptr(), base.add(at), src.len());
    }

    /// Copy `dst.len()` bytes out of the block starting at `at`.
    ///
    /// # Safety
    /// `at + dst.len()` must be within capacity and no other thread may
    /// concurrently write the source range.
    pub(crate) unsafe fn copy_out(&self, at: usize, dst: &mut [u8]) {
        debug_assert!(at + dst.len() <= self.capacity);
        let base = (*self.storage.get()).as_ptr();
        ptr::copy_nonoverlapping(base.add(at), dst.as_mut_ptr(), dst.len());
    }

    /// Mutable view of `[at, at + len)`.
    ///
    /// # Safety
    /// The range must be within capacity and exclusively owned by the caller
    /// for the lifetime of the returned slice.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn window_mut(&self, at: usize, len: usize) -> &mut [u8] {
        debug_assert!(at + len <= self.capacity);
        let base = (*self.storage.get()).as_mut_ptr();
        slice::from_raw_parts_mut(base.add(at), len)
    }
}

/// A position in the buffered byte stream: (block sequence number, byte
/// index within that block).
///
/// Sequence numbers are assigned when a block is linked into the chain, so a
/// cursor stays meaningful across chain mutations without holding a pointer
/// into it. The default value is the "unset" cursor, used where an operation
/// distinguishes "no position" from a real one (e.g. the `consumed` argument
/// of `consuming_complete`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub(crate) block: u64,
    pub(crate) index: usize,
}

impl Cursor {
    /// The default, not-a-position cursor. Block sequence 0 is never
    /// assigned to a real block.
    pub const UNSET: Cursor = Cursor { block: 0, index: 0 };

    pub(crate) fn new(block: u64, index: usize) -> Self {
        Self { block, index }
    }

    /// True if this is the default cursor rather than a chain position.
    #[inline]
    pub fn is_unset(&self) -> bool {
        self.block == 0
    }
}
