//! Tagged, versioned, reference-counted atomic shared pointers.
//!
//! This crate provides the synchronization primitive used by the concurrent
//! collections in the workspace: an atomically updatable cell holding a
//! shared pointer together with a version counter and a one-bit user tag,
//! all packed into a single 128-bit word.
//!
//! # Cell layout
//!
//! ```text
//! u128 cell:
//! ┌───────────┬─────────────┬──────────────────────────────┐
//! │ loans:u32 │ version:u32 │ word:u64 = pointer | tag bit │
//! │  127..96  │   95..64    │            63..0             │
//! └───────────┴─────────────┴──────────────────────────────┘
//! ```
//!
//! - **word**: the pointee address with the tag in bit 0. Pointees are at
//!   least 8-byte aligned, so the bit is always free.
//! - **version**: bumped on every pointer installation. A compare-exchange
//!   matches on (word, version), so a cell that transiently held other values
//!   and returned to the same pointer still fails stale expectations.
//! - **loans**: the number of strong handles this cell has handed out for the
//!   currently installed pointer. Settled against the pointee's shared count
//!   when the pointer is swapped out.
//!
//! # Reference accounting
//!
//! Pointees implement [`RefCounted`] and embed their own counter. Installing
//! a pointer into a cell transfers a fixed `BIAS` of ownership to the cell;
//! each [`AtomicSharedPtr::load`] hands out one loaned handle; swapping the
//! pointer out releases `BIAS - loans`. Loaned handles settle directly
//! against the pointee counter when dropped. The counter reaching zero
//! invokes [`RefCounted::destroy`] exactly once.
//!
//! # Lock-freedom requirement
//!
//! All cell updates go through a genuine 16-byte compare-exchange
//! (`cmpxchg16b` on x86-64, `ldxp`/`stxp` on AArch64). Targets where
//! `portable_atomic::AtomicU128` degrades to a lock are unsupported: a
//! locked fallback serializes the version counter updates that the ABA
//! protection depends on.

mod atomic_shared_ptr;
mod raw;
mod shared_ptr;

pub use atomic_shared_ptr::AtomicSharedPtr;
pub use shared_ptr::{RefCounted, SharedPtr, VersionedPtr};
