//! Fixed-capacity record buffers and the bounded blocking pool they live in.
//!
//! A [`BlockPool`] pre-allocates a fixed number of [`Block`]s at construction
//! and never allocates again. `allocate` hands a block out, suspending the
//! caller while the pool is empty; `release` puts it back and wakes one
//! waiter. This is the backpressure mechanism of the whole engine: a reader
//! thread that has filled every block sleeps in `allocate` until a consumer
//! returns one, which bounds total in-flight memory to the pool's budget.

use crate::errors::{Result, SortError};
use crate::record::Record;
use parking_lot::{Condvar, Mutex};

/// A bounded, reusable buffer holding up to `capacity` records.
///
/// Capacity is fixed for the lifetime of the block; the data buffer is owned
/// exclusively by whoever holds the block. Blocks come from a [`BlockPool`]
/// and must eventually be released back to the same pool.
#[derive(Debug)]
pub struct Block<T> {
    records: Vec<T>,
    capacity: usize,
}

impl<T> Block<T> {
    /// Create a block reserving space for `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { records: Vec::with_capacity(capacity), capacity }
    }

    /// Maximum number of records this block can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the block holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when the block is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    /// Append a record. The block must not be full.
    pub fn push(&mut self, value: T) {
        debug_assert!(self.records.len() < self.capacity, "push into a full block");
        self.records.push(value);
    }

    /// Drop all records, keeping capacity.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The records as a slice.
    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// The records as a mutable slice (used by the in-place block sort).
    pub fn records_mut(&mut self) -> &mut [T] {
        &mut self.records
    }
}

/// A fixed set of pre-allocated blocks with blocking allocation.
///
/// Shared across threads behind an `Arc`. At any quiescent point
/// `outstanding() + free() == block_count()`.
pub struct BlockPool<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    block_count: usize,
    block_capacity: usize,
}

struct PoolState<T> {
    free: Vec<Block<T>>,
    outstanding: usize,
}

impl<T: Record> BlockPool<T> {
    /// Create a pool of `block_count` blocks dividing a budget of
    /// `mem_bytes` bytes.
    ///
    /// Each block reserves `mem_bytes / block_count / T::SIZE` records of
    /// capacity. The division truncates; a configuration whose per-block
    /// capacity rounds to zero is rejected before anything is allocated.
    pub fn new(mem_bytes: usize, block_count: usize) -> Result<Self> {
        if block_count < 2 {
            return Err(SortError::InvalidConfig {
                reason: format!("block count must be at least 2, got {block_count}"),
            });
        }
        let block_capacity = mem_bytes / block_count / T::SIZE;
        if block_capacity == 0 {
            return Err(SortError::InvalidConfig {
                reason: format!(
                    "memory budget of {mem_bytes} bytes yields zero-capacity blocks \
                     ({block_count} blocks of {}-byte records)",
                    T::SIZE
                ),
            });
        }

        let free = (0..block_count).map(|_| Block::with_capacity(block_capacity)).collect();
        Ok(Self {
            state: Mutex::new(PoolState { free, outstanding: 0 }),
            available: Condvar::new(),
            block_count,
            block_capacity,
        })
    }

    /// Take a free block, suspending until one is released if none is free.
    ///
    /// The returned block is empty and has its full capacity. Never fails;
    /// a caller that holds every outstanding block and allocates again
    /// deadlocks, which is a programming error.
    pub fn allocate(&self) -> Block<T> {
        let mut state = self.state.lock();
        while state.free.is_empty() {
            self.available.wait(&mut state);
        }
        let block = state.free.pop().expect("non-empty free list");
        state.outstanding += 1;
        block
    }

    /// Return a block to the pool and wake one waiter.
    pub fn release(&self, mut block: Block<T>) {
        block.clear();
        let mut state = self.state.lock();
        debug_assert!(state.outstanding > 0, "release without a matching allocate");
        state.outstanding -= 1;
        state.free.push(block);
        drop(state);
        self.available.notify_one();
    }

    /// Number of blocks currently handed out. Observational only; may lag
    /// by the duration of a critical section.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Number of blocks currently free.
    #[must_use]
    pub fn free(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Total number of blocks in the pool.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Record capacity of every block in the pool.
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }
}
