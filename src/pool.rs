// Block pool interface and the default heap-backed implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::{Block, BlockHandle};

/// Source of fixed-capacity blocks for the input channel.
///
/// The channel never allocates raw storage itself; it leases blocks here and
/// hands them back once the consumer has advanced past them.
pub trait BlockPool: Send + Sync {
    /// Lease a block with `block_size` capacity.
    fn lease(&self) -> BlockHandle;

    /// Return a block to the pool.
    ///
    /// Implementations must not hand the block to a new lessee while other
    /// handles to it are still live.
    fn release(&self, block: BlockHandle);

    /// Capacity of blocks produced by [`lease`](BlockPool::lease).
    fn block_size(&self) -> usize;
}

/// Default heap-backed pool with a free list.
///
/// Released blocks are recycled only when their handle is unique at release
/// time; a block released while something else still holds a handle (e.g. an
/// in-flight write reservation surviving a dispose) is dropped from
/// circulation instead, so it can never be re-leased while writable
/// elsewhere.
pub struct SlabPool {
    block_size: usize,
    free: Mutex<Vec<BlockHandle>>,
    leased: AtomicUsize,
}

impl SlabPool {
    pub const DEFAULT_BLOCK_SIZE: usize = 4096;

    pub fn new() -> Arc<Self> {
        Self::with_block_size(Self::DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Arc<Self> {
        Arc::new(Self {
            block_size,
            free: Mutex::new(Vec::new()),
            leased: AtomicUsize::new(0),
        })
    }

    /// Number of blocks currently out on lease.
    pub fn leased_blocks(&self) -> usize {
        self.leased.load(Ordering::Acquire)
    }

    /// Number of blocks parked in the free list.
    pub fn pooled_blocks(&self) -> usize {
        self.free.lock().len()
    }
}

impl BlockPool for SlabPool {
    fn lease(&self) -> BlockHandle {
        self.leased.fetch_add(1, Ordering::AcqRel);
        if let Some(block) = self.free.lock().pop() {
            return block;
        }
        Block::with_capacity(self.block_size)
    }

    fn release(&self, block: BlockHandle) {
        self.leased.fetch_sub(1, Ordering::AcqRel);
        // Only unique handles go back into circulation.
        if Arc::strong_count(&block) == 1 {
            self.free.lock().push(block);
        }
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}
