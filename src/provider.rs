//! The heap provider: the external collaborator that actually owns memory.
//!
//! The allocator core never calls the OS directly; it asks a
//! [`HeapProvider`] to extend a single contiguous region and to report that
//! region's current bounds. This crate ships [`SbrkHeap`], which drives the
//! process break with `libc::sbrk`, exactly as the teacher bump allocator
//! this crate started from does. Tests use [`tests::FakeHeap`], a
//! `Vec`-backed arena, so the allocator's invariants can be exercised
//! without perturbing the real process break (and so many tests can run in
//! the same process without fighting over it).

use libc::{c_void, sbrk};
use std::ptr::NonNull;

/// Grants page-granular extensions of a contiguous address range and
/// reports its bounds. Modeled on spec §6's collaborator contract; `FAIL`
/// becomes `None` since that's the idiomatic Rust shape for "no address".
pub trait HeapProvider {
  /// Extends the region by `n_bytes` and returns the address the region
  /// used to end at (the start of the new space), or `None` on failure.
  fn extend(&mut self, n_bytes: usize) -> Option<NonNull<u8>>;

  /// Lowest valid address in the region, or `None` before the first
  /// successful [`extend`](HeapProvider::extend).
  fn heap_low(&self) -> Option<NonNull<u8>>;

  /// Highest valid address in the region (inclusive), or `None` before the
  /// first successful [`extend`](HeapProvider::extend).
  fn heap_high(&self) -> Option<NonNull<u8>>;
}

/// A [`HeapProvider`] backed by the process break (`sbrk(2)`).
///
/// Tracks the lowest address it has ever handed out so `heap_low` doesn't
/// need a second syscall; `heap_high` is always `sbrk(0) - 1`.
pub struct SbrkHeap {
  low: Option<NonNull<u8>>,
}

impl SbrkHeap {
  pub const fn new() -> Self {
    Self { low: None }
  }
}

impl Default for SbrkHeap {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapProvider for SbrkHeap {
  fn extend(&mut self, n_bytes: usize) -> Option<NonNull<u8>> {
    let raw = unsafe { sbrk(n_bytes as libc::intptr_t) };
    if raw == usize::MAX as *mut c_void {
      return None;
    }
    let addr = NonNull::new(raw as *mut u8)?;
    if self.low.is_none() {
      self.low = Some(addr);
    }
    Some(addr)
  }

  fn heap_low(&self) -> Option<NonNull<u8>> {
    self.low
  }

  fn heap_high(&self) -> Option<NonNull<u8>> {
    let current_break = unsafe { sbrk(0) };
    if current_break == usize::MAX as *mut c_void {
      return None;
    }
    NonNull::new(unsafe { (current_break as *mut u8).sub(1) })
  }
}
