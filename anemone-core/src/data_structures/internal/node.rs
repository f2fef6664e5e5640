use std::cell::{Cell, UnsafeCell};
use std::ptr;
use std::sync::atomic::AtomicUsize;

use anemone_atomic::{AtomicSharedPtr, RefCounted};
use anemone_pool::ObjectPool;

use crate::data_structures::ordering::MinKey;

pub(crate) type NodePool<K, V> = ObjectPool<ListNode<K, V>>;

/// One element of the chain: a key, a claimable payload, and a tagged link
/// to the successor.
///
/// Slots live in the pool for the lifetime of their list. `Default` is the
/// pristine state a pool block starts from; `activate` is the per-incarnation
/// reset performed while the slot is exclusively owned. The link cell is
/// deliberately left alone on both paths so its version counter survives
/// recycling; that is what lets a thread holding a stale versioned pointer
/// fail its compare-exchange instead of corrupting a recycled node.
pub(crate) struct ListNode<K, V> {
    count: AtomicUsize,
    /// Immutable from activation until the slot recycles.
    pub(crate) key: K,
    /// Taken exactly once, by whoever wins the retirement race.
    value: UnsafeCell<Option<V>>,
    pub(crate) next: AtomicSharedPtr<ListNode<K, V>>,
    pool: Cell<*const NodePool<K, V>>,
}

impl<K, V> ListNode<K, V> {
    /// Bring a freshly acquired slot to life.
    pub(crate) fn activate(&mut self, key: K, value: Option<V>, pool: *const NodePool<K, V>) {
        debug_assert_eq!(*self.count.get_mut(), 0, "activating a referenced slot");
        *self.count.get_mut() = 1;
        self.key = key;
        *self.value.get_mut() = value;
        self.pool.set(pool);
    }

    /// Claim the payload.
    ///
    /// # Safety
    ///
    /// Only the thread that won the retirement race for this node may call
    /// this, and only once.
    pub(crate) unsafe fn take_value(&self) -> Option<V> {
        (*self.value.get()).take()
    }
}

impl<K: MinKey, V> Default for ListNode<K, V> {
    fn default() -> Self {
        ListNode {
            count: AtomicUsize::new(0),
            key: K::MIN,
            value: UnsafeCell::new(None),
            next: AtomicSharedPtr::null(),
            pool: Cell::new(ptr::null()),
        }
    }
}

impl<K, V> RefCounted for ListNode<K, V> {
    fn shared_count(&self) -> &AtomicUsize {
        &self.count
    }

    unsafe fn destroy(ptr: *mut Self) {
        let node = &mut *ptr;
        // Drop an unclaimed payload; claimed nodes already gave theirs up.
        node.value.get_mut().take();
        let pool = node.pool.get();
        debug_assert!(!pool.is_null(), "node destroyed without a pool");
        (*pool).release(ptr);
    }
}

// Safety: the raw pool pointer and the payload cell are only touched under
// the exclusivity rules above; everything else is atomic.
unsafe impl<K: Send, V: Send> Send for ListNode<K, V> {}
unsafe impl<K: Send + Sync, V: Send> Sync for ListNode<K, V> {}
