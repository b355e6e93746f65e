//! Block layout primitives.
//!
//! A block is a contiguous heap region bounded by a header and a footer
//! word, each encoding `size | alloc_bit`. `size` is always a multiple of
//! [`DOUBLE_WORD_SIZE`] so the low bit never aliases it. These functions are
//! the only place in the crate that computes a header/footer address from a
//! payload pointer; every other module goes through them.
//!
//! `bp` throughout this module is a *payload pointer*: the address a caller
//! holds, `header_address + WORD_SIZE`. Every function here requires `bp` to
//! be a valid payload pointer of a block currently in the heap; the
//! prologue/epilogue sentinels make the two ends of that traversal safe.

use std::ptr::NonNull;

/// A header/footer cell: `size | alloc_bit` packed into one machine word.
/// A newtype-by-alias rather than a wrapper struct — every bit operation on
/// it (masking the alloc bit, comparing sizes) is exactly the `usize`
/// operation, so a distinct type would only add `.0` noise at every call
/// site without buying extra safety.
pub type Word = usize;

/// Size of a header/footer cell; equals the native pointer width.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();
/// The alignment unit: two words. Every block size is a multiple of this.
pub const DOUBLE_WORD_SIZE: usize = 2 * WORD_SIZE;
/// Smallest possible block: header + footer + two free-list link words.
pub const MIN_BLOCK_SIZE: usize = 4 * WORD_SIZE;
/// Default heap-extension quantum.
pub const CHUNK_SIZE: usize = 4096;

static_assertions::const_assert_eq!(DOUBLE_WORD_SIZE, 2 * WORD_SIZE);
static_assertions::const_assert!(MIN_BLOCK_SIZE >= DOUBLE_WORD_SIZE);
static_assertions::const_assert!(CHUNK_SIZE % DOUBLE_WORD_SIZE == 0);

#[inline]
unsafe fn read_word(p: *mut Word) -> Word {
  unsafe { p.read() }
}

#[inline]
unsafe fn write_word(p: *mut Word, value: Word) {
  unsafe { p.write(value) }
}

/// Packs a block size and allocation flag into a header/footer word.
#[inline]
pub const fn pack(size: usize, alloc: bool) -> Word {
  size | (alloc as usize)
}

/// Address of `bp`'s header word (one word before the payload).
#[inline]
pub fn header(bp: NonNull<u8>) -> *mut Word {
  unsafe { bp.as_ptr().sub(WORD_SIZE) as *mut Word }
}

/// Address of `bp`'s footer word, given its (already-written) header.
#[inline]
pub fn footer(bp: NonNull<u8>) -> *mut Word {
  unsafe { bp.as_ptr().add(size(bp) - DOUBLE_WORD_SIZE) as *mut Word }
}

/// Total block size (header + payload + footer), masking off the alloc bit.
#[inline]
pub fn size(bp: NonNull<u8>) -> usize {
  unsafe { read_word(header(bp)) & !(DOUBLE_WORD_SIZE - 1) }
}

/// `true` if `bp`'s header marks the block allocated.
#[inline]
pub fn alloc(bp: NonNull<u8>) -> bool {
  unsafe { read_word(header(bp)) & 1 != 0 }
}

/// Writes `size | alloc` to both `bp`'s header and footer.
///
/// Callers must have already established that `bp + size` does not run
/// past the heap (i.e. that `size` was computed correctly); this function
/// does not itself bounds-check.
pub fn write_block(bp: NonNull<u8>, size: usize, alloc: bool) {
  let word = pack(size, alloc);
  unsafe {
    write_word(header(bp), word);
    write_word(bp.as_ptr().add(size - DOUBLE_WORD_SIZE) as *mut Word, word);
  }
}

/// Payload pointer of the block physically following `bp`.
#[inline]
pub fn next_block(bp: NonNull<u8>) -> NonNull<u8> {
  unsafe { NonNull::new_unchecked(bp.as_ptr().add(size(bp))) }
}

/// Payload pointer of the block physically preceding `bp`, found via the
/// boundary tag: the word at `bp - DOUBLE_WORD_SIZE` is the previous
/// block's footer, which holds its size.
#[inline]
pub fn prev_block(bp: NonNull<u8>) -> NonNull<u8> {
  unsafe {
    let prev_footer = bp.as_ptr().sub(DOUBLE_WORD_SIZE) as *mut usize;
    let prev_size = read_word(prev_footer) & !(DOUBLE_WORD_SIZE - 1);
    NonNull::new_unchecked(bp.as_ptr().sub(prev_size))
  }
}

/// Reads the free-list predecessor link stored in word 0 of `bp`'s payload.
#[inline]
pub fn link_prev(bp: NonNull<u8>) -> Option<NonNull<u8>> {
  unsafe { NonNull::new(read_word(bp.as_ptr() as *mut Word) as *mut u8) }
}

/// Reads the free-list successor link stored in word 1 of `bp`'s payload.
#[inline]
pub fn link_next(bp: NonNull<u8>) -> Option<NonNull<u8>> {
  unsafe { NonNull::new(read_word(bp.as_ptr().add(WORD_SIZE) as *mut Word) as *mut u8) }
}

/// Overwrites the free-list predecessor link in `bp`'s payload.
#[inline]
pub fn set_link_prev(bp: NonNull<u8>, prev: Option<NonNull<u8>>) {
  let raw = prev.map_or(0, |p| p.as_ptr() as usize);
  unsafe { write_word(bp.as_ptr() as *mut Word, raw) }
}

/// Overwrites the free-list successor link in `bp`'s payload.
#[inline]
pub fn set_link_next(bp: NonNull<u8>, next: Option<NonNull<u8>>) {
  let raw = next.map_or(0, |p| p.as_ptr() as usize);
  unsafe { write_word(bp.as_ptr().add(WORD_SIZE) as *mut Word, raw) }
}
