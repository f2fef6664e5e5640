//! Concurrent keyed queues.
//!
//! The flagship structure is [`SortedList`], a lock-free linearizable
//! priority queue: many producers insert `(key, value)` pairs, many
//! consumers pop the minimum-keyed entry. [`Heap`] is its single-threaded
//! sibling with the same surface, for callers that do not need concurrency.
//!
//! ```ignore
//! use anemone_core::SortedList;
//!
//! let queue: SortedList<u64, &str> = SortedList::new();
//! queue.insert(3, "b");
//! queue.insert(5, "a");
//! assert_eq!(queue.try_pop(), Some("b"));
//! ```

pub mod common_tests;
pub mod data_structures;

pub use data_structures::ordering::{Compare, MaxFirst, MinFirst, MinKey};
pub use data_structures::sorted::{Heap, SortedList};
