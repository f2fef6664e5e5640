use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use anemone_atomic::SharedPtr;
use anemone_pool::ObjectPool;
use crossbeam_utils::CachePadded;

use crate::data_structures::internal::{ListNode, NodePool};
use crate::data_structures::ordering::{Compare, MinFirst, MinKey};

/// Nodes allocated per pool block.
const NODE_BLOCK_CAPACITY: usize = 128;

///
/// Lock-free concurrent sorted list: a linearizable priority queue where
/// producers insert keyed values and consumers pop the minimum-keyed entry.
///
// =============================================================================
// CHAIN STRUCTURE & RETIREMENT
// =============================================================================
//
// Singly linked chain, sorted ascending under the comparator, fronted by a
// permanent sentinel:
//
// ┌──────┐    ┌──────┐    ┌──────┐    ┌──────┐    ┌──────┐
// │ SENT │───►│  3   │───►│  5   │───►│  7   │───►│ NULL │
// │      │    │      │    │      │    │      │    │      │
// └──────┘    └──────┘    └──────┘    └──────┘    └──────┘
//
// Every link is an `AtomicSharedPtr`: a 128-bit cell carrying the successor
// pointer, a retired-tag bit, a version counter, and the loan count of the
// reference accounting. The tag on a node's NEXT link means the node itself
// has been popped:
//
//   pop:     SENT.next = head            (expected, versioned)
//            head.next.load_and_set_tag  <- linearization; first tagger owns
//                                          the payload
//            CAS SENT.next: head -> head.next   (physical unlink)
//            head.next = NULL|TAG               (dead tail for late readers)
//
// A retired node may stay transiently reachable if its popper is preempted
// between tagging and unlinking. Inserters that walk onto such a node help
// unlink it, which is what bounds everyone's retries.
//
// INVARIANTS:
// 1. The sentinel is reachable and never retired; its link is never tagged.
// 2. Adjacent reachable nodes a -> b satisfy !less(b.key, a.key).
// 3. Exactly one CAS publishes a node; exactly one tag-set retires it.
// 4. A node's storage returns to the pool only when its shared count drops
//    to zero, so stale handles never read recycled memory.
//
// CAS FAILURE CASES DURING INSERT
// ===============================
//
// The publish CAS expects (pointer, tag, version) as observed:
//
// - A competing insert landed at the same spot: version moved, CAS fails,
//   restart from the sentinel.
// - The predecessor was popped: its link is now tagged, the untagged
//   expectation fails, restart. This is why the tag lives in the pointer
//   word; splicing after a retired predecessor would lose the new node.
// - The successor was popped and already unlinked: version moved, restart.
//
// The version counter closes the ABA hole left by pooled storage: a link
// observed as P@v matches a later CAS only if no install happened in
// between, even though P's storage may have been recycled and republished
// elsewhere meanwhile.
//
pub struct SortedList<K: MinKey, V, C: Compare<K> = MinFirst> {
    size: CachePadded<AtomicUsize>,
    sentinel: SharedPtr<ListNode<K, V>>,
    pool: Box<NodePool<K, V>>,
    comparator: C,
}

impl<K, V, C> SortedList<K, V, C>
where
    K: MinKey,
    C: Compare<K>,
{
    pub fn new() -> Self {
        Self::with_block_capacity(NODE_BLOCK_CAPACITY)
    }

    /// Create a list whose node pool grows `block_capacity` nodes at a time.
    pub fn with_block_capacity(block_capacity: usize) -> Self {
        let pool: Box<NodePool<K, V>> = Box::new(ObjectPool::with_block_capacity(block_capacity));
        let sentinel = Self::allocate_node(&pool, K::MIN, None);
        SortedList {
            size: CachePadded::new(AtomicUsize::new(0)),
            sentinel,
            pool,
            comparator: C::default(),
        }
    }

    /// Insert a `(key, value)` pair at its sorted position.
    ///
    /// Always succeeds; a lost publication race just retries from the
    /// sentinel. Linearizes at the successful publish CAS.
    pub fn insert(&self, key: K, value: V) {
        let entry = Self::allocate_node(&self.pool, key, Some(value));

        while !self.try_insert(&entry) {}

        self.size.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop the minimum-keyed entry's value.
    ///
    /// Returns `None` iff the list was empty at the linearization point.
    pub fn try_pop(&self) -> Option<V> {
        let mut key = K::MIN;
        self.try_pop_internal(&mut key, false).map(|(_, value)| value)
    }

    /// Pop the minimum-keyed entry together with its key.
    pub fn try_pop_entry(&self) -> Option<(K, V)> {
        let mut key = K::MIN;
        self.try_pop_internal(&mut key, false)
    }

    /// Pop only if the current top key equals `expected_key` under the
    /// comparator.
    ///
    /// On a key mismatch, writes the observed top key into `expected_key`
    /// and returns `None`, so the caller can retry with fresh expectations.
    /// On an empty list, returns `None` with `expected_key` untouched.
    pub fn compare_try_pop(&self, expected_key: &mut K) -> Option<V> {
        let (key, value) = self.try_pop_internal(expected_key, true)?;
        *expected_key = key;
        Some(value)
    }

    /// Advisory snapshot of the top key.
    ///
    /// The reported key may have been popped by the time the caller looks
    /// at it.
    pub fn try_peek_top_key(&self) -> Option<K> {
        let head = self.sentinel_node().next.load();
        // Safety: a non-null strong handle pins the node.
        unsafe { head.as_ptr().as_ref() }.map(|node| node.key)
    }

    /// Advisory size.
    ///
    /// Eventually consistent: it may transiently read zero mid-publish, or
    /// positive while a failed pop reverts its claim.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Sever every link and reset the size.
    ///
    /// The exclusive borrow is the quiescence requirement: no other thread
    /// may hold a reference to the list while this runs. Also used by drop.
    pub fn unsafe_clear(&mut self) {
        let mut curr = self.sentinel_node().next.load();
        self.sentinel_node().next.store(SharedPtr::null());

        while !curr.is_null() {
            // Safety: the handle pins the node.
            let node = unsafe { &*curr.as_ptr() };
            let next = node.next.load();
            node.next.store(SharedPtr::null());
            // Dropping the old handle recycles the node.
            curr = next;
        }

        self.size.store(0, Ordering::Relaxed);
    }

    fn allocate_node(
        pool: &NodePool<K, V>,
        key: K,
        value: Option<V>,
    ) -> SharedPtr<ListNode<K, V>> {
        let ptr = pool.acquire();
        // Safety: a freshly acquired slot is exclusively owned and carries a
        // zero count; activation installs the single unit this handle adopts.
        unsafe {
            (*ptr).activate(key, value, pool as *const _);
            SharedPtr::from_owned(ptr)
        }
    }

    fn sentinel_node(&self) -> &ListNode<K, V> {
        // Safety: the sentinel handle lives as long as the list.
        unsafe { &*self.sentinel.as_ptr() }
    }

    /// One bounded insertion attempt; false means restart from the sentinel.
    fn try_insert(&self, entry: &SharedPtr<ListNode<K, V>>) -> bool {
        // Safety: `entry` is not yet reachable; this thread owns it.
        let entry_node = unsafe { &*entry.as_ptr() };

        // `prev` is the sentinel or a node pinned by `prev_guard`.
        let mut prev_guard: SharedPtr<ListNode<K, V>>;
        let mut prev: *const ListNode<K, V> = self.sentinel.as_ptr();
        let mut curr = self.sentinel_node().next.load();

        while !curr.is_null() {
            // Safety: a non-null handle pins the node.
            let curr_node = unsafe { &*curr.as_ptr() };

            if self.comparator.less(&entry_node.key, &curr_node.key) {
                // The entry belongs before `curr`. Equal keys fall through
                // and land after every existing equal.
                break;
            }

            let next = curr_node.next.load();

            if next.is_tagged() {
                // `curr` was popped but not yet unlinked; help unlink it.
                let mut splice = next;
                splice.clear_tag();
                let expected = curr.as_versioned();
                // Safety: `prev` is pinned (see above).
                if unsafe { (*prev).next.compare_exchange(expected, splice) }.is_ok() {
                    // Late readers of the unlinked node see a dead tail.
                    curr_node.next.store(SharedPtr::null_tagged());
                }

                curr = unsafe { (*prev).next.load() };
                if curr.is_tagged() {
                    // `prev` itself was retired underneath us; nothing past
                    // it can be trusted.
                    return false;
                }
            } else {
                prev_guard = curr;
                prev = prev_guard.as_ptr();
                curr = next;
            }
        }

        // Wire the successor while the entry is still private, then publish.
        entry_node.next.store(curr.clone());

        let expected = curr.as_versioned();
        drop(curr);
        // Safety: `prev` is pinned (see above).
        unsafe { (*prev).next.compare_exchange(expected, entry.clone()) }.is_ok()
    }

    /// Shared pop routine. `match_key` selects compare-mode.
    fn try_pop_internal(&self, expected_key: &mut K, match_key: bool) -> Option<(K, V)> {
        // One tentative claim against the advisory size stands in for an
        // empty probe. The counter is unsigned; a result in the far half of
        // the range means the claim wrapped below zero and the list was
        // empty.
        let claimed = self.size.fetch_sub(1, Ordering::AcqRel).wrapping_sub(1);
        if usize::MAX - claimed < usize::MAX / 2 {
            self.size.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        loop {
            let head = self.sentinel_node().next.load();
            let head_node = match unsafe { head.as_ptr().as_ref() } {
                Some(node) => node,
                None => {
                    self.size.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            };

            if match_key && !self.comparator.equal(expected_key, &head_node.key) {
                *expected_key = head_node.key;
                self.size.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            // Retirement: the first thread to set the tag owns the payload.
            let mut splice = head_node.next.load_and_set_tag();
            let claimed_here = !splice.is_tagged();
            splice.clear_tag();

            let expected = head.as_versioned();
            if self
                .sentinel_node()
                .next
                .compare_exchange(expected, splice)
                .is_ok()
            {
                // Physically unlinked; leave a dead tail for late readers.
                head_node.next.store(SharedPtr::null_tagged());
            }
            // On failure some other thread already unlinked `head`.

            if claimed_here {
                let key = head_node.key;
                // Safety: winning the tag race confers the exclusive claim.
                let value = unsafe { head_node.take_value() }
                    .expect("retired node without a payload");
                return Some((key, value));
            }
            // Someone else popped this node first; take the next head.
        }
    }

    /// Walk the chain under quiescence and check its structural invariants.
    /// Returns the chain length. Test support.
    pub(crate) fn validate_quiescent(&self) -> usize {
        let mut seen = HashSet::new();
        let mut prev_key: Option<K> = None;
        let mut length = 0;

        let mut curr = self.sentinel_node().next.load();
        assert!(!curr.is_tagged(), "sentinel link carries the retired tag");

        while let Some(node) = unsafe { curr.as_ptr().as_ref() } {
            assert!(
                seen.insert(curr.as_ptr() as usize),
                "chain revisits a node address"
            );
            if let Some(prev) = prev_key {
                assert!(
                    !self.comparator.less(&node.key, &prev),
                    "chain keys out of order"
                );
            }
            prev_key = Some(node.key);
            length += 1;

            let next = node.next.load();
            assert!(!next.is_tagged(), "quiescent chain holds a retired node");
            curr = next;
        }

        length
    }
}

impl<K, V, C> Default for SortedList<K, V, C>
where
    K: MinKey,
    C: Compare<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MinKey, V, C: Compare<K>> Drop for SortedList<K, V, C> {
    fn drop(&mut self) {
        self.unsafe_clear();
        // Field order finishes the job: the sentinel handle drops (recycling
        // the sentinel node) before the pool releases its blocks.
    }
}

// ============================================================================
// Tests - Unique to SortedList
// ============================================================================
// End-to-end scenarios and the shared stress harnesses live in tests/.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::ordering::MaxFirst;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pops_in_key_order() {
        let list: SortedList<u32, &str> = SortedList::new();
        list.insert(5, "a");
        list.insert(3, "b");
        list.insert(7, "c");

        assert_eq!(list.try_pop_entry(), Some((3, "b")));
        assert_eq!(list.try_pop_entry(), Some((5, "a")));
        assert_eq!(list.try_pop_entry(), Some((7, "c")));
        assert_eq!(list.try_pop_entry(), None);
    }

    #[test]
    fn equal_keys_pop_in_insertion_order() {
        let list: SortedList<u32, u32> = SortedList::new();
        list.insert(2, 1);
        list.insert(2, 2);
        list.insert(2, 3);

        // The comparator is strictly less, so each duplicate lands after
        // the existing equals.
        assert_eq!(list.try_pop(), Some(1));
        assert_eq!(list.try_pop(), Some(2));
        assert_eq!(list.try_pop(), Some(3));
        assert_eq!(list.try_pop(), None);
    }

    #[test]
    fn max_first_pops_largest() {
        let list: SortedList<i64, i64, MaxFirst> = SortedList::new();
        for key in [4, -2, 9, 0] {
            list.insert(key, key);
        }
        assert_eq!(list.try_pop(), Some(9));
        assert_eq!(list.try_pop(), Some(4));
        assert_eq!(list.try_pop(), Some(0));
        assert_eq!(list.try_pop(), Some(-2));
    }

    #[test]
    fn nodes_recycle_through_the_pool() {
        let list: SortedList<u64, u64> = SortedList::with_block_capacity(8);

        // Far more incarnations than pool slots.
        for round in 0..1_000 {
            list.insert(round, round);
            assert_eq!(list.try_pop(), Some(round));
        }
        assert_eq!(list.validate_quiescent(), 0);
    }

    #[test]
    fn clear_empties_and_list_remains_usable() {
        let mut list: SortedList<u32, u32> = SortedList::new();
        for i in 0..100 {
            list.insert(i, i);
        }
        list.unsafe_clear();
        assert_eq!(list.size(), 0);
        assert_eq!(list.try_pop(), None);

        list.insert(1, 10);
        assert_eq!(list.try_pop(), Some(10));
    }

    #[test]
    fn concurrent_insert_keeps_the_chain_sorted() {
        let list: Arc<SortedList<u64, u64>> = Arc::new(SortedList::new());

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for i in 0..1_000u64 {
                        // Interleaved key ranges force collisions at every
                        // insertion point.
                        list.insert(i * 8 + t, t);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(list.validate_quiescent(), 8_000);

        let mut prev = None;
        while let Some((key, _)) = list.try_pop_entry() {
            if let Some(prev) = prev {
                assert!(key >= prev);
            }
            prev = Some(key);
        }
    }

    #[test]
    fn concurrent_pop_claims_each_entry_once() {
        let list: Arc<SortedList<u64, u64>> = Arc::new(SortedList::new());
        for i in 0..4_000u64 {
            list.insert(i, i + 1_000_000);
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(entry) = list.try_pop_entry() {
                        mine.push(entry);
                    }
                    mine
                })
            })
            .collect();

        let mut all: Vec<(u64, u64)> = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }

        all.sort_unstable();
        assert_eq!(all.len(), 4_000, "every entry popped exactly once");
        for (i, (key, value)) in all.iter().enumerate() {
            assert_eq!(*key, i as u64);
            assert_eq!(*value, i as u64 + 1_000_000);
        }
        assert_eq!(list.validate_quiescent(), 0);
    }

    #[test]
    fn mixed_insert_pop_churn() {
        let list: Arc<SortedList<u64, u64>> = Arc::new(SortedList::new());

        let producers: Vec<_> = (0..4u64)
            .map(|t| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for i in 0..5_000u64 {
                        list.insert(i * 4 + t, i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    let mut popped = 0u64;
                    for _ in 0..10_000 {
                        if list.try_pop().is_some() {
                            popped += 1;
                        }
                    }
                    popped
                })
            })
            .collect();

        for handle in producers {
            handle.join().unwrap();
        }
        let mut popped: u64 = consumers.into_iter().map(|h| h.join().unwrap()).sum();

        while list.try_pop().is_some() {
            popped += 1;
        }

        assert_eq!(popped, 20_000, "every inserted entry was popped exactly once");
        assert_eq!(list.validate_quiescent(), 0);
    }
}
