//! A concurrent object pool with stable addresses.
//!
//! The pool hands out raw pointers into block-allocated slabs and recycles
//! them through a lock-free FIFO. It exists for type-stable memory: a caller
//! that holds a stale pointer to a recycled slot must be able to read the
//! slot's synchronization fields without ever touching freed memory, so
//! slots are only returned to the operating system when the pool itself is
//! dropped.
//!
//! # Design
//!
//! - Storage grows in fixed-capacity blocks. Blocks are linked through an
//!   atomic head pointer; appending races are resolved by CAS, the loser
//!   frees its block and re-reads the free queue.
//! - Each slot of a fresh block is default-initialized exactly once and
//!   pushed to the free queue. Recycling neither drops nor reinitializes a
//!   slot; the next `acquire` caller finds it exactly as released.
//! - `acquire` and `release` are lock-free; both are just queue operations,
//!   plus an occasional block append on growth.
//!
//! Dropping the pool frees every block and invalidates all outstanding
//! pointers. Destruction must not be concurrent with use.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam::queue::SegQueue;
use crossbeam_utils::CachePadded;

/// A pointer travelling through the free queue.
struct FreeSlot<T>(*mut T);

// Safety: the wrapped pointer is only dereferenced by the thread that
// acquired it; the queue merely transports the address.
unsafe impl<T: Send> Send for FreeSlot<T> {}

/// One slab of `capacity` default-initialized slots.
struct Block<T> {
    slots: *mut T,
    capacity: usize,
    prev: *mut Block<T>,
}

impl<T: Default> Block<T> {
    fn allocate(capacity: usize, prev: *mut Block<T>) -> *mut Block<T> {
        let slab: Box<[T]> = (0..capacity).map(|_| T::default()).collect();
        let slots = Box::into_raw(slab) as *mut T;
        Box::into_raw(Box::new(Block {
            slots,
            capacity,
            prev,
        }))
    }
}

impl<T> Block<T> {
    /// # Safety
    ///
    /// `block` must come from `allocate` and must not be freed twice. All
    /// pointers into the slab become dangling.
    unsafe fn free(block: *mut Block<T>) {
        let owned = Box::from_raw(block);
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
            owned.slots,
            owned.capacity,
        )));
    }
}

/// Slab-style concurrent object pool.
///
/// `T: Default` supplies the pristine state of a freshly allocated slot.
pub struct ObjectPool<T> {
    free: CachePadded<SegQueue<FreeSlot<T>>>,
    last_block: CachePadded<AtomicPtr<Block<T>>>,
    block_capacity: usize,
}

impl<T: Default> ObjectPool<T> {
    /// Create a pool that grows `block_capacity` slots at a time, with the
    /// first block allocated eagerly.
    pub fn with_block_capacity(block_capacity: usize) -> Self {
        assert!(block_capacity > 0, "pool blocks must hold at least one slot");
        let pool = ObjectPool {
            free: CachePadded::new(SegQueue::new()),
            last_block: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            block_capacity,
        };
        pool.try_alloc_block();
        pool
    }

    /// Take a slot out of the pool.
    ///
    /// The slot is either pristine (`T::default()`) or exactly as the last
    /// `release` left it. The pointer stays valid until the pool is dropped.
    pub fn acquire(&self) -> *mut T {
        loop {
            if let Some(FreeSlot(slot)) = self.free.pop() {
                return slot;
            }
            self.try_alloc_block();
        }
    }

    /// Append one block unless slots became available in the meantime.
    fn try_alloc_block(&self) {
        let expected = self.last_block.load(Ordering::Relaxed);

        if !self.free.is_empty() {
            return;
        }

        let block = Block::allocate(self.block_capacity, expected);

        if self
            .last_block
            .compare_exchange(expected, block, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another thread appended first; its slots are (or will be) in
            // the queue.
            unsafe { Block::free(block) };
            return;
        }

        let slots = unsafe { (*block).slots };
        for i in 0..self.block_capacity {
            self.free.push(FreeSlot(unsafe { slots.add(i) }));
        }
    }
}

impl<T> ObjectPool<T> {
    /// Return a slot for FIFO recycling.
    ///
    /// # Safety
    ///
    /// `slot` must have come from `acquire` on this pool and must not be
    /// used, or released again, until the next `acquire` hands it out.
    pub unsafe fn release(&self, slot: *mut T) {
        debug_assert!(!slot.is_null());
        self.free.push(FreeSlot(slot));
    }

    /// Advisory count of free slots.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl<T> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        let mut block = self.last_block.load(Ordering::Relaxed);
        while !block.is_null() {
            let prev = unsafe { (*block).prev };
            // Safety: exclusive access at drop; each block is freed once.
            unsafe { Block::free(block) };
            block = prev;
        }
        // The free queue only holds addresses into the slabs freed above.
    }
}

// Safety: the pool hands out raw slots but all shared state is mediated by
// the lock-free queue and the atomic block head.
unsafe impl<T: Send> Send for ObjectPool<T> {}
unsafe impl<T: Send> Sync for ObjectPool<T> {}
