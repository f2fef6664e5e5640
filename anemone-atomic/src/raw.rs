//! Bit-layout helpers for the 128-bit cell.
//!
//! Kept separate so the handle and the cell agree on a single definition of
//! the packing.

/// Tag bit inside the pointer word. Pointees are >= 8-byte aligned.
pub(crate) const TAG_BIT: u64 = 0b1;

/// Mask recovering the clean pointer from the word.
pub(crate) const PTR_MASK: u64 = !TAG_BIT;

/// The tag bit at its position within the full cell.
pub(crate) const CELL_TAG: u128 = TAG_BIT as u128;

const VERSION_SHIFT: u32 = 64;
const LOAN_SHIFT: u32 = 96;

/// One loan, positioned at the loan field. Adding this to a cell value
/// increments the loan count; overflow wraps within the field because it
/// occupies the topmost bits.
pub(crate) const LOAN_UNIT: u128 = 1u128 << LOAN_SHIFT;

#[inline]
pub(crate) fn pack(word: u64, version: u32, loans: u32) -> u128 {
    (word as u128) | ((version as u128) << VERSION_SHIFT) | ((loans as u128) << LOAN_SHIFT)
}

#[inline]
pub(crate) fn word_of(cell: u128) -> u64 {
    cell as u64
}

#[inline]
pub(crate) fn version_of(cell: u128) -> u32 {
    (cell >> VERSION_SHIFT) as u32
}

#[inline]
pub(crate) fn loans_of(cell: u128) -> u32 {
    (cell >> LOAN_SHIFT) as u32
}
