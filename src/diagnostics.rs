//! The consistency checker's informational output.
//!
//! [`Violation`] is returned by [`crate::Allocator::check_heap`] and, as
//! each one is discovered, traced via [`tracing::warn!`] — a caller that
//! wants the original C checker's "print problems to the console" behavior
//! gets it for free by installing any `tracing` subscriber; a test gets a
//! structured, assertable `Vec` instead of scraping stdout.
//!
//! This is diagnostic output only. Nothing here feeds back into the
//! allocator's own decisions.

use std::fmt;

/// One detected break of an invariant from the data model. Addresses are
/// the block's payload pointer, formatted as a hex `usize` for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
  /// The prologue is missing, mis-sized, or marked free.
  BadPrologue,
  /// The epilogue is missing, non-zero-sized, or marked free.
  BadEpilogue,
  /// A block's payload pointer is not double-word aligned.
  Misaligned { addr: usize },
  /// A block's header word and footer word disagree.
  HeaderFooterMismatch { addr: usize },
  /// Two physically adjacent blocks are both free — coalescing missed one.
  AdjacentFreeBlocks { first: usize, second: usize },
  /// A block on the free list has its allocated bit set.
  FreeListMemberAllocated { addr: usize },
  /// A block on the free list lies outside the provider's reported bounds.
  FreeListMemberOutOfBounds { addr: usize },
  /// The number of free blocks found walking the implicit list does not
  /// match the number of nodes on the explicit free list.
  FreeListCountMismatch { heap_walk_count: usize, free_list_count: usize },
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      Violation::BadPrologue => write!(f, "bad prologue header"),
      Violation::BadEpilogue => write!(f, "bad epilogue header"),
      Violation::Misaligned { addr } => write!(f, "block at {addr:#x} is not double-word aligned"),
      Violation::HeaderFooterMismatch { addr } => {
        write!(f, "block at {addr:#x} has a header/footer mismatch")
      }
      Violation::AdjacentFreeBlocks { first, second } => write!(
        f,
        "free block at {first:#x} was not coalesced with its free successor at {second:#x}"
      ),
      Violation::FreeListMemberAllocated { addr } => {
        write!(f, "allocated block at {addr:#x} found on the free list")
      }
      Violation::FreeListMemberOutOfBounds { addr } => {
        write!(f, "free list member at {addr:#x} lies outside the heap bounds")
      }
      Violation::FreeListCountMismatch { heap_walk_count, free_list_count } => write!(
        f,
        "free block count mismatch: {heap_walk_count} found walking the heap, {free_list_count} on the free list"
      ),
    }
  }
}
