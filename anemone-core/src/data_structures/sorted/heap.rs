use crate::data_structures::ordering::{Compare, MinFirst};

/// Single-threaded binary heap with the same surface as the concurrent
/// sorted list.
///
/// Intended for callers that want the pop-minimum API without paying for
/// synchronization. Equal keys pop in no particular order.
pub struct Heap<K, V, C = MinFirst> {
    entries: Vec<(K, V)>,
    comparator: C,
}

impl<K, V, C> Heap<K, V, C>
where
    K: Copy,
    C: Compare<K>,
{
    pub fn new() -> Self {
        Heap {
            entries: Vec::new(),
            comparator: C::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Heap {
            entries: Vec::with_capacity(capacity),
            comparator: C::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, key: K, value: V) {
        self.entries.push((key, value));
        self.sift_up(self.entries.len() - 1);
    }

    pub fn try_pop(&mut self) -> Option<V> {
        self.pop_root().map(|(_, value)| value)
    }

    pub fn try_pop_entry(&mut self) -> Option<(K, V)> {
        self.pop_root()
    }

    /// Pop only if the top key equals `expected_key` under the comparator.
    /// On a mismatch, writes the observed top key and returns `None`.
    pub fn compare_try_pop(&mut self, expected_key: &mut K) -> Option<V> {
        let &(top, _) = self.entries.first()?;
        if !self.comparator.equal(expected_key, &top) {
            *expected_key = top;
            return None;
        }
        let (key, value) = self.pop_root()?;
        *expected_key = key;
        Some(value)
    }

    pub fn try_peek_top_key(&self) -> Option<K> {
        self.entries.first().map(|&(key, _)| key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
    }

    pub fn shrink_to_fit(&mut self) {
        self.entries.shrink_to_fit();
    }

    fn pop_root(&mut self) -> Option<(K, V)> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let entry = self.entries.pop();
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        entry
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self
                .comparator
                .less(&self.entries[index].0, &self.entries[parent].0)
            {
                break;
            }
            self.entries.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.entries.len();
        loop {
            let left = index * 2 + 1;
            let right = left + 1;
            let mut target = index;

            if left < len
                && self
                    .comparator
                    .less(&self.entries[left].0, &self.entries[target].0)
            {
                target = left;
            }
            if right < len
                && self
                    .comparator
                    .less(&self.entries[right].0, &self.entries[target].0)
            {
                target = right;
            }

            if target == index {
                break;
            }
            self.entries.swap(index, target);
            index = target;
        }
    }
}

impl<K, V, C> Default for Heap<K, V, C>
where
    K: Copy,
    C: Compare<K>,
{
    fn default() -> Self {
        Self::new()
    }
}
