//! Data structures for keyed queues.
//!
//! # Organization
//!
//! - [`sorted`] - The concurrent sorted list and the sequential heap
//! - [`ordering`] - Key and comparator traits shared by both
//! - `internal` - Node layout and pool wiring (pub(crate))

pub(crate) mod internal;
pub mod ordering;
pub mod sorted;

// Re-exports for convenience
pub use ordering::{Compare, MaxFirst, MinFirst, MinKey};
pub use sorted::Heap;
pub use sorted::SortedList;
