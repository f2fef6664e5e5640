use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{fence, Ordering};

use portable_atomic::AtomicU128;

use crate::raw;
use crate::shared_ptr::{RefCounted, SharedPtr, VersionedPtr};

/// Ownership transferred to a cell when a pointer is installed.
///
/// Strictly larger than any count of handles a cell can loan out between two
/// installations (the loan field is 32 bits wide and wraps), so the count of
/// a pointee held by a cell never reaches zero while loans are outstanding.
const BIAS: usize = 1 << 32;

/// An atomically updatable cell holding a tagged, versioned, counted shared
/// pointer.
///
/// All mutation goes through 16-byte compare-exchange on the packed word
/// described in the crate docs. Successful updates are acquire-release,
/// failed ones acquire, so a caller that loses a race still observes a
/// coherent view of whatever it read.
pub struct AtomicSharedPtr<T: RefCounted> {
    cell: AtomicU128,
    _marker: PhantomData<*mut T>,
}

impl<T: RefCounted> AtomicSharedPtr<T> {
    /// An empty cell (null pointer, version zero).
    #[inline]
    pub const fn null() -> Self {
        AtomicSharedPtr {
            cell: AtomicU128::new(0),
            _marker: PhantomData,
        }
    }

    /// A cell born holding `first`.
    pub fn new(first: SharedPtr<T>) -> Self {
        let cell = Self::null();
        cell.store(first);
        cell
    }

    /// Load a strong handle to the current pointee, or a null handle.
    ///
    /// Non-null loads take a loan from the cell: the loan field is bumped in
    /// the same compare-exchange that validates the read, so the handle is
    /// accounted against exactly the pointer it refers to.
    pub fn load(&self) -> SharedPtr<T> {
        let mut current = self.cell.load(Ordering::Acquire);
        loop {
            let word = raw::word_of(current);
            if word & raw::PTR_MASK == 0 {
                return SharedPtr::from_loaded(word, raw::version_of(current));
            }
            match self.cell.compare_exchange_weak(
                current,
                current.wrapping_add(raw::LOAN_UNIT),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return SharedPtr::from_loaded(word, raw::version_of(current)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Read the (word, version) pair without reference traffic.
    #[inline]
    pub fn load_versioned(&self) -> VersionedPtr<T> {
        let current = self.cell.load(Ordering::Acquire);
        VersionedPtr::new(raw::word_of(current), raw::version_of(current))
    }

    /// Load a strong handle and atomically set the tag bit.
    ///
    /// The returned handle reports the tag state *before* this call, so the
    /// caller can tell whether it won the race to set it. Setting the tag
    /// does not bump the version; the changed word already invalidates any
    /// untagged expectation.
    pub fn load_and_set_tag(&self) -> SharedPtr<T> {
        let mut current = self.cell.load(Ordering::Acquire);
        loop {
            let word = raw::word_of(current);
            let is_null = word & raw::PTR_MASK == 0;
            if is_null && word & raw::TAG_BIT != 0 {
                // Already a tagged null; nothing left to claim.
                return SharedPtr::from_loaded(word, raw::version_of(current));
            }
            let mut desired = current | raw::CELL_TAG;
            if !is_null {
                desired = desired.wrapping_add(raw::LOAN_UNIT);
            }
            match self
                .cell
                .compare_exchange_weak(current, desired, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return SharedPtr::from_loaded(word, raw::version_of(current)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Install `new` iff the cell still holds exactly `expected`.
    ///
    /// On success the cell consumes the handle, bumps the version, resets
    /// the loan count, and releases its ownership of the previous pointee.
    /// On failure `new` is handed back untouched and the cell is unchanged.
    ///
    /// A load that merely took a loan does not invalidate `expected`; the
    /// comparison covers the pointer word (tag included) and the version
    /// only.
    pub fn compare_exchange(
        &self,
        expected: VersionedPtr<T>,
        new: SharedPtr<T>,
    ) -> Result<(), SharedPtr<T>> {
        Self::charge_install(&new);
        let new_word = new.word();

        let mut current = self.cell.load(Ordering::Acquire);
        loop {
            if raw::word_of(current) != expected.word()
                || raw::version_of(current) != expected.version()
            {
                Self::refund_install(&new);
                return Err(new);
            }
            let desired = raw::pack(
                new_word,
                raw::version_of(current).wrapping_add(1),
                0,
            );
            match self
                .cell
                .compare_exchange_weak(current, desired, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(prev) => {
                    // Safety: this thread swapped the old pointer out and is
                    // solely responsible for settling the cell's ownership.
                    unsafe {
                        Self::release_ownership(raw::word_of(prev), raw::loans_of(prev));
                    }
                    new.into_raw();
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Unconditionally install `new`, releasing the previous pointee.
    ///
    /// Atomic with respect to concurrent loads and compare-exchanges; use it
    /// where no expectation is required (initialization of a not yet
    /// published link, dead-tail marking of an unlinked node, teardown).
    pub fn store(&self, new: SharedPtr<T>) {
        Self::charge_install(&new);
        let new_word = new.word();

        let mut current = self.cell.load(Ordering::Relaxed);
        loop {
            let desired = raw::pack(
                new_word,
                raw::version_of(current).wrapping_add(1),
                0,
            );
            match self
                .cell
                .compare_exchange_weak(current, desired, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(prev) => {
                    // Safety: as in compare_exchange.
                    unsafe {
                        Self::release_ownership(raw::word_of(prev), raw::loans_of(prev));
                    }
                    new.into_raw();
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Give the incoming pointee the cell's full ownership share. Combined
    /// with the one unit the consumed handle already owns, the cell holds
    /// exactly `BIAS`.
    fn charge_install(new: &SharedPtr<T>) {
        if let Some(pointee) = unsafe { new.as_ptr().as_ref() } {
            pointee.shared_count().fetch_add(BIAS - 1, Ordering::Relaxed);
        }
    }

    /// Undo `charge_install` for a handle that will not be installed. The
    /// handle's own unit remains, so the count cannot reach zero here.
    fn refund_install(new: &SharedPtr<T>) {
        if let Some(pointee) = unsafe { new.as_ptr().as_ref() } {
            let prev = pointee.shared_count().fetch_sub(BIAS - 1, Ordering::Release);
            debug_assert!(prev > BIAS - 1);
        }
    }

    /// Settle a swapped-out pointer: the cell owned `BIAS`, of which `loans`
    /// units now live on as independently dropped handles.
    ///
    /// # Safety
    ///
    /// `word` must have been atomically swapped out of this cell by the
    /// caller, exactly once.
    unsafe fn release_ownership(word: u64, loans: u32) {
        let ptr = (word & raw::PTR_MASK) as *mut T;
        if ptr.is_null() {
            return;
        }
        let delta = BIAS - loans as usize;
        let prev = unsafe { (*ptr).shared_count().fetch_sub(delta, Ordering::Release) };
        debug_assert!(prev >= delta);
        if prev == delta {
            fence(Ordering::Acquire);
            unsafe { T::destroy(ptr) };
        }
    }
}

impl<T: RefCounted> Default for AtomicSharedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: RefCounted> Drop for AtomicSharedPtr<T> {
    fn drop(&mut self) {
        let current = self.cell.load(Ordering::Relaxed);
        // Safety: exclusive access; the cell's ownership is settled exactly
        // once. Handles loaned out earlier remain valid and settle on their
        // own.
        unsafe {
            Self::release_ownership(raw::word_of(current), raw::loans_of(current));
        }
    }
}

impl<T: RefCounted> fmt::Debug for AtomicSharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.cell.load(Ordering::Relaxed);
        f.debug_struct("AtomicSharedPtr")
            .field("ptr", &((raw::word_of(current) & raw::PTR_MASK) as *const T))
            .field("tagged", &(raw::word_of(current) & raw::TAG_BIT != 0))
            .field("version", &raw::version_of(current))
            .field("loans", &raw::loans_of(current))
            .finish()
    }
}

// Safety: the cell mediates all shared mutation through atomic operations.
unsafe impl<T: RefCounted + Send + Sync> Send for AtomicSharedPtr<T> {}
unsafe impl<T: RefCounted + Send + Sync> Sync for AtomicSharedPtr<T> {}
