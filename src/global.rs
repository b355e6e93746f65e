//! A [`GlobalAlloc`] front-end over [`Allocator`].
//!
//! This is a thin adapter, not part of the invariant-bearing core: it
//! translates a [`Layout`] into the payload-size requests `Allocator`
//! understands and lazily bootstraps the heap on first use. Like the
//! free-list `GlobalAlloc` wrappers elsewhere in this ecosystem, it is
//! `unsafe impl Sync` purely to satisfy the trait bound — the allocator
//! itself is not thread-safe, and using this as a `#[global_allocator]` in
//! a multithreaded binary is undefined behavior.
//!
//! Alignment requests stricter than [`DOUBLE_WORD_SIZE`] are refused (`None`
//! /null), since every payload pointer this allocator hands out is only
//! ever double-word aligned.

use std::alloc::{GlobalAlloc, Layout};
use std::cell::UnsafeCell;
use std::ptr::{self, NonNull};

use crate::allocator::Allocator;
use crate::block::DOUBLE_WORD_SIZE;
use crate::provider::{HeapProvider, SbrkHeap};

/// A `#[global_allocator]`-compatible wrapper. Single-threaded use only.
pub struct RallocGlobal<P: HeapProvider = SbrkHeap> {
  inner: UnsafeCell<Option<Allocator<P>>>,
}

impl<P: HeapProvider> RallocGlobal<P> {
  pub const fn new() -> Self {
    Self { inner: UnsafeCell::new(None) }
  }
}

impl<P: HeapProvider> Default for RallocGlobal<P> {
  fn default() -> Self {
    Self::new()
  }
}

// SAFETY: not actually safe for concurrent use; required only to satisfy
// `GlobalAlloc`'s `Sync` bound. See the module-level safety note.
unsafe impl<P: HeapProvider> Sync for RallocGlobal<P> {}

unsafe impl<P: HeapProvider + Default> GlobalAlloc for RallocGlobal<P> {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() > DOUBLE_WORD_SIZE {
      return ptr::null_mut();
    }
    let slot = unsafe { &mut *self.inner.get() };
    if slot.is_none() {
      *slot = Allocator::init(P::default()).ok();
    }
    match slot {
      Some(allocator) => allocator.malloc(layout.size()).map_or(ptr::null_mut(), NonNull::as_ptr),
      None => ptr::null_mut(),
    }
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    let slot = unsafe { &mut *self.inner.get() };
    if let Some(allocator) = slot {
      allocator.free(NonNull::new(ptr));
    }
  }

  unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
    if layout.align() > DOUBLE_WORD_SIZE {
      return ptr::null_mut();
    }
    let slot = unsafe { &mut *self.inner.get() };
    match slot {
      Some(allocator) => allocator
        .realloc(NonNull::new(ptr), new_size)
        .map_or(ptr::null_mut(), NonNull::as_ptr),
      None => ptr::null_mut(),
    }
  }
}
