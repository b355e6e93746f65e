//! # rallocator - A boundary-tag, explicit-free-list memory allocator
//!
//! This crate provides a `malloc`/`free`/`realloc` style dynamic memory
//! allocator that manages a single contiguous heap region using the
//! classic boundary-tag design: every block carries a header and a footer
//! word encoding `size | alloc_bit`, free blocks are threaded onto a
//! doubly-linked explicit free list through their own payload bytes, and
//! adjacent free blocks are coalesced eagerly on every `free`.
//!
//! ```text
//!   One block on the heap:
//!
//!   ┌────────┬──────────────────────────────────────┬────────┐
//!   │ header │               payload                │ footer │
//!   │ size|a │   (free blocks: prev/next link here)  │ size|a │
//!   └────────┴──────────────────────────────────────┴────────┘
//!            ▲
//!            └── pointer returned to the caller
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   rallocator
//!   ├── align       - alignment helpers (align!, align_up, is_aligned)
//!   ├── block       - header/footer/link primitives, the only pointer math
//!   ├── freelist    - explicit free list insert/remove
//!   ├── provider    - the HeapProvider trait + the sbrk-backed SbrkHeap
//!   ├── allocator   - Allocator: init/malloc/free/realloc/check_heap
//!   ├── diagnostics - Violation, the checker's structured findings
//!   ├── error       - InitError
//!   └── global      - RallocGlobal, a #[global_allocator]-compatible wrapper
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use rallocator::{Allocator, SbrkHeap};
//!
//! # fn main() -> Result<(), rallocator::InitError> {
//! let mut heap = Allocator::init(SbrkHeap::new())?;
//! let ptr = heap.malloc(64).expect("allocation failed");
//! unsafe {
//!     ptr.as_ptr().write(42);
//!     assert_eq!(ptr.as_ptr().read(), 42);
//! }
//! heap.free(Some(ptr));
//! # Ok(())
//! # }
//! ```
//!
//! Swapping in [`RallocGlobal`] as `#[global_allocator]` drives every `Box`,
//! `Vec`, and `String` in the program through this allocator instead:
//!
//! ```rust,ignore
//! use rallocator::RallocGlobal;
//!
//! #[global_allocator]
//! static GLOBAL: RallocGlobal = RallocGlobal::new();
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no internal synchronization; see
//!   [`RallocGlobal`]'s safety note.
//! - **Never shrinks**: the heap grows via [`HeapProvider::extend`] but is
//!   never returned to the provider.
//! - **First-fit placement**: not the fastest possible strategy, but the one
//!   this design is built and checked around.
//!
//! ## Safety
//!
//! This crate manages raw memory directly; most of its internals are
//! `unsafe`. The public `Allocator` API itself is safe to call (payload
//! pointers are only ever handed out as valid, writable regions), but
//! writing through a returned pointer past its requested size, or using a
//! pointer after it has been freed, is undefined behavior, exactly as with
//! the allocator design this crate implements.

pub mod align;
mod allocator;
mod block;
mod diagnostics;
mod error;
mod freelist;
mod global;
pub mod provider;

pub use allocator::Allocator;
pub use block::{Word, CHUNK_SIZE, DOUBLE_WORD_SIZE, MIN_BLOCK_SIZE, WORD_SIZE};
pub use diagnostics::Violation;
pub use error::InitError;
pub use global::RallocGlobal;
pub use provider::{HeapProvider, SbrkHeap};
