//! The allocator core: layout adjustment, placement, coalescing, heap
//! extension, and the three public operations (`malloc`, `free`,
//! `realloc`).
//!
//! State is grouped into one [`Allocator`] value — the heap provider, the
//! prologue's payload pointer (the start of the implicit block traversal),
//! and the free-list head — rather than module-scoped statics. A
//! process-wide singleton is only introduced in [`crate::global`], for
//! callers that need a `#[global_allocator]` or C-style free functions.

use std::cmp::max;
use std::ptr::NonNull;

use crate::block::{
  alloc, footer, header, next_block, pack, prev_block, size, write_block, CHUNK_SIZE,
  DOUBLE_WORD_SIZE, MIN_BLOCK_SIZE, WORD_SIZE,
};
use crate::diagnostics::Violation;
use crate::error::InitError;
use crate::freelist;
use crate::provider::HeapProvider;

/// Owns the heap provider and every piece of allocator state: the
/// prologue's payload pointer and the free-list head.
pub struct Allocator<P: HeapProvider> {
  provider: P,
  /// Payload pointer of the prologue block — the fixed starting point for
  /// an implicit (physical-address-order) heap walk.
  heap_start: NonNull<u8>,
  free_list_head: Option<NonNull<u8>>,
}

impl<P: HeapProvider> Allocator<P> {
  /// Bootstraps the heap: an 8-word region holding an alignment pad, the
  /// prologue header/footer, and the epilogue header, followed by one
  /// default-size chunk of free space.
  #[tracing::instrument(skip_all)]
  pub fn init(mut provider: P) -> Result<Self, InitError> {
    let raw = provider.extend(8 * WORD_SIZE).ok_or(InitError::ProviderExhausted)?;
    let base = raw.as_ptr();

    // Alignment padding, prologue header, prologue footer, epilogue header.
    // The remaining four words of this 8-word request go unused for the
    // life of the process (the heap never shrinks) — a small, one-time
    // cost of requesting more than `init` actually lays out.
    unsafe {
      (base as *mut usize).write(0);
      (base.add(WORD_SIZE) as *mut usize).write(pack(DOUBLE_WORD_SIZE, true));
      (base.add(2 * WORD_SIZE) as *mut usize).write(pack(DOUBLE_WORD_SIZE, true));
      (base.add(3 * WORD_SIZE) as *mut usize).write(pack(0, true));
    }

    let heap_start = unsafe { NonNull::new_unchecked(base.add(2 * WORD_SIZE)) };
    let mut allocator = Self { provider, heap_start, free_list_head: None };

    allocator
      .extend_heap(CHUNK_SIZE / WORD_SIZE)
      .ok_or(InitError::ProviderExhausted)?;
    Ok(allocator)
  }

  /// Allocates a block with at least `size` bytes of payload, or `None` if
  /// `size` is zero or the provider is exhausted.
  #[tracing::instrument(skip(self))]
  pub fn malloc(&mut self, size: usize) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }
    let asize = Self::adjust_size(size);

    if let Some(bp) = self.find_fit(asize) {
      self.place(bp, asize);
      return Some(bp);
    }

    let extend_words = max(asize, CHUNK_SIZE) / WORD_SIZE;
    let bp = self.extend_heap(extend_words)?;
    self.place(bp, asize);
    Some(bp)
  }

  /// Frees a block. A `None` pointer is a no-op; freeing a pointer not
  /// currently allocated on this heap is undefined behavior, as in `free`.
  #[tracing::instrument(skip(self))]
  pub fn free(&mut self, bp: Option<NonNull<u8>>) {
    let Some(bp) = bp else { return };
    let block_size = size(bp);
    write_block(bp, block_size, false);
    self.coalesce(bp);
  }

  /// Resizes `bp` to hold at least `new_size` bytes of payload, preserving
  /// its contents. `new_size == 0` frees `bp` and returns `None`. A `None`
  /// `bp` behaves like `malloc(new_size)`.
  #[tracing::instrument(skip(self))]
  pub fn realloc(&mut self, bp: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
    if new_size == 0 {
      self.free(bp);
      return None;
    }
    let Some(bp) = bp else {
      return self.malloc(new_size);
    };

    // Header + footer overhead on top of the requested payload. This is
    // deliberately not the same quantity as `adjust_size`'s `asize`: it
    // covers only the two boundary-tag words, not double-word rounding.
    let reqsize = new_size + DOUBLE_WORD_SIZE;
    let cur_total = size(bp);

    if cur_total >= reqsize {
      return Some(bp);
    }

    let next = next_block(bp);
    if !alloc(next) && cur_total + size(next) >= reqsize {
      freelist::remove(&mut self.free_list_head, next);
      let combined = cur_total + size(next);
      write_block(bp, combined, true);
      return Some(bp);
    }

    let new_bp = self.malloc(reqsize)?;
    // Copy only what the old block actually held, capped at what the
    // caller asked for — not `reqsize`, which counts header/footer bytes
    // that were never part of the old payload.
    let copy_len = std::cmp::min(cur_total - DOUBLE_WORD_SIZE, new_size);
    unsafe {
      std::ptr::copy_nonoverlapping(bp.as_ptr(), new_bp.as_ptr(), copy_len);
    }
    self.free(Some(bp));
    Some(new_bp)
  }

  /// Walks the implicit heap and the free list, reporting every invariant
  /// violation found. An empty result means the heap is internally
  /// consistent. Never mutates state.
  pub fn check_heap(&self) -> Vec<Violation> {
    let mut violations = Vec::new();

    if size(self.heap_start) != DOUBLE_WORD_SIZE || !alloc(self.heap_start) {
      violations.push(Violation::BadPrologue);
      tracing::warn!("{}", Violation::BadPrologue);
    }

    let mut bp = self.heap_start;
    let mut heap_walk_free_count = 0usize;
    loop {
      let block_size = size(bp);
      if block_size == 0 {
        if !alloc(bp) {
          violations.push(Violation::BadEpilogue);
          tracing::warn!("{}", Violation::BadEpilogue);
        }
        break;
      }

      let addr = bp.as_ptr() as usize;
      if !crate::align::is_aligned(addr, DOUBLE_WORD_SIZE) {
        let v = Violation::Misaligned { addr };
        tracing::warn!("{v}");
        violations.push(v);
      }
      if unsafe { header(bp).read() } != unsafe { footer(bp).read() } {
        let v = Violation::HeaderFooterMismatch { addr };
        tracing::warn!("{v}");
        violations.push(v);
      }

      if !alloc(bp) {
        heap_walk_free_count += 1;
        let successor = next_block(bp);
        if size(successor) > 0 && !alloc(successor) {
          let v = Violation::AdjacentFreeBlocks {
            first: addr,
            second: successor.as_ptr() as usize,
          };
          tracing::warn!("{v}");
          violations.push(v);
        }
      }

      bp = next_block(bp);
    }

    let low = self.provider.heap_low().map(|p| p.as_ptr() as usize);
    let high = self.provider.heap_high().map(|p| p.as_ptr() as usize);
    let mut free_list_count = 0usize;
    let mut cur = self.free_list_head;
    while let Some(node) = cur {
      free_list_count += 1;
      if alloc(node) {
        let v = Violation::FreeListMemberAllocated { addr: node.as_ptr() as usize };
        tracing::warn!("{v}");
        violations.push(v);
      }
      let addr = node.as_ptr() as usize;
      let in_bounds = matches!((low, high), (Some(lo), Some(hi)) if addr >= lo && addr <= hi);
      if !in_bounds {
        let v = Violation::FreeListMemberOutOfBounds { addr };
        tracing::warn!("{v}");
        violations.push(v);
      }
      cur = crate::block::link_next(node);
    }

    if heap_walk_free_count != free_list_count {
      let v = Violation::FreeListCountMismatch {
        heap_walk_count: heap_walk_free_count,
        free_list_count,
      };
      tracing::warn!("{v}");
      violations.push(v);
    }

    violations
  }

  /// `size <= D` rounds up to the minimum block; otherwise payload +
  /// header/footer, rounded up to a double-word multiple.
  fn adjust_size(size: usize) -> usize {
    if size <= DOUBLE_WORD_SIZE {
      2 * DOUBLE_WORD_SIZE
    } else {
      DOUBLE_WORD_SIZE * ((size + DOUBLE_WORD_SIZE + (DOUBLE_WORD_SIZE - 1)) / DOUBLE_WORD_SIZE)
    }
  }

  /// First-fit: the first free block whose size is at least `asize`.
  fn find_fit(&self, asize: usize) -> Option<NonNull<u8>> {
    let mut cur = self.free_list_head;
    while let Some(bp) = cur {
      if size(bp) >= asize {
        return Some(bp);
      }
      cur = crate::block::link_next(bp);
    }
    None
  }

  /// Places an `asize`-byte allocation at `bp`, splitting off a free
  /// remainder when it would be at least [`MIN_BLOCK_SIZE`].
  fn place(&mut self, bp: NonNull<u8>, asize: usize) {
    let total = size(bp);
    freelist::remove(&mut self.free_list_head, bp);

    if total - asize >= MIN_BLOCK_SIZE {
      write_block(bp, asize, true);
      let remainder = next_block(bp);
      write_block(remainder, total - asize, false);
      freelist::insert(&mut self.free_list_head, remainder);
    } else {
      write_block(bp, total, true);
    }
  }

  /// Boundary-tag coalescing over the four neighbor-allocation cases.
  /// Always returns the (possibly relocated) merged block, already
  /// re-inserted into the free list.
  fn coalesce(&mut self, bp: NonNull<u8>) -> NonNull<u8> {
    let prev = prev_block(bp);
    let next = next_block(bp);
    // The prologue is always allocated, so treating bp's own edge (when
    // there is no real predecessor) as "previous allocated" is safe.
    let prev_is_alloc = prev == bp || alloc(prev);
    let next_is_alloc = alloc(next);

    let mut new_bp = bp;
    let mut new_size = size(bp);

    if prev_is_alloc && !next_is_alloc {
      new_size += size(next);
      freelist::remove(&mut self.free_list_head, next);
      write_block(new_bp, new_size, false);
    } else if !prev_is_alloc && next_is_alloc {
      new_size += size(prev);
      freelist::remove(&mut self.free_list_head, prev);
      new_bp = prev;
      write_block(new_bp, new_size, false);
    } else if !prev_is_alloc && !next_is_alloc {
      new_size += size(prev) + size(next);
      freelist::remove(&mut self.free_list_head, prev);
      freelist::remove(&mut self.free_list_head, next);
      new_bp = prev;
      write_block(new_bp, new_size, false);
    }

    freelist::insert(&mut self.free_list_head, new_bp);
    new_bp
  }

  /// Requests at least `words` words from the provider (rounded up to an
  /// even count to preserve double-word alignment), lays out a free block
  /// there, installs a fresh epilogue, and coalesces with whatever free
  /// block may already sit at the old epilogue's location.
  fn extend_heap(&mut self, words: usize) -> Option<NonNull<u8>> {
    let even_words = words + (words & 1);
    let bytes = even_words * WORD_SIZE;

    let raw = self.provider.extend(bytes)?;
    // `raw` is exactly where the old epilogue header lived; the new
    // block's header goes there.
    let bp = unsafe { NonNull::new_unchecked(raw.as_ptr().add(WORD_SIZE)) };
    write_block(bp, bytes, false);

    let new_epilogue = next_block(bp);
    unsafe { header(new_epilogue).write(pack(0, true)) };

    Some(self.coalesce(bp))
  }

  /// Number of free blocks linked into the explicit free list. Exposed for
  /// tests; not part of the allocator's own decision-making.
  #[cfg(test)]
  pub(crate) fn free_list_len(&self) -> usize {
    let mut count = 0;
    let mut cur = self.free_list_head;
    while let Some(bp) = cur {
      count += 1;
      cur = crate::block::link_next(bp);
    }
    count
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::provider::tests::FakeHeap;

  const ARENA: usize = 1 << 20;

  fn new_allocator() -> Allocator<FakeHeap> {
    Allocator::init(FakeHeap::with_capacity(ARENA)).expect("init should succeed with ample capacity")
  }

  fn is_aligned(p: NonNull<u8>, align: usize) -> bool {
    (p.as_ptr() as usize) % align == 0
  }

  #[test]
  fn init_malloc_free_leaves_one_large_free_block() {
    let mut a = new_allocator();
    let p = a.malloc(1).expect("malloc(1) should succeed");
    assert!(is_aligned(p, DOUBLE_WORD_SIZE));
    a.free(Some(p));

    assert_eq!(a.free_list_len(), 1);
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn split_and_reuse_most_recently_freed_head_block() {
    let mut a = new_allocator();
    let block_a = a.malloc(24).unwrap();
    let block_b = a.malloc(24).unwrap();
    a.free(Some(block_a));
    let block_c = a.malloc(24).unwrap();

    assert_eq!(block_c, block_a);
    assert!(block_b != block_c);
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn coalesce_merges_three_consecutive_freed_blocks() {
    let mut a = new_allocator();
    let block_a = a.malloc(32).unwrap();
    let _block_b = a.malloc(32).unwrap();
    let block_c = a.malloc(32).unwrap();

    // Nothing else was ever allocated out of the first chunk, so once a,
    // b, c and the leftover tail are all free again, coalescing must have
    // folded every free neighbor back into one block spanning the chunk.
    a.free(Some(block_a));
    a.free(Some(block_c));
    a.free(Some(_block_b));

    assert_eq!(a.free_list_len(), 1);
    let merged = a.free_list_head.expect("one merged free block");
    assert_eq!(merged, block_a);
    assert_eq!(size(merged), CHUNK_SIZE);
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn realloc_grows_in_place_into_a_free_successor() {
    let mut a = new_allocator();
    let block_a = a.malloc(32).unwrap();
    let block_b = a.malloc(32).unwrap();
    a.free(Some(block_b));

    let grown = a.realloc(Some(block_a), 48).unwrap();
    assert_eq!(grown, block_a);

    let next_alloc = a.malloc(32).unwrap();
    assert!(next_alloc != block_a);
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn realloc_copy_path_preserves_contents() {
    let mut a = new_allocator();
    let block_a = a.malloc(32).unwrap();
    let _pin = a.malloc(32).unwrap(); // keep block_a's successor allocated

    unsafe {
      for i in 0..32u8 {
        block_a.as_ptr().add(i as usize).write(i);
      }
    }

    let grown = a.realloc(Some(block_a), 128).unwrap();
    assert_ne!(grown, block_a);

    unsafe {
      for i in 0..32u8 {
        assert_eq!(grown.as_ptr().add(i as usize).read(), i);
      }
    }
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn shrinking_realloc_is_a_no_op_pointer_wise() {
    let mut a = new_allocator();
    let p = a.malloc(64).unwrap();
    let shrunk = a.realloc(Some(p), 8).unwrap();
    assert_eq!(shrunk, p);
  }

  #[test]
  fn realloc_to_zero_frees_and_returns_none() {
    let mut a = new_allocator();
    let p = a.malloc(16).unwrap();
    assert!(a.realloc(Some(p), 0).is_none());
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn realloc_null_behaves_like_malloc() {
    let mut a = new_allocator();
    let p = a.realloc(None, 16).unwrap();
    assert!(is_aligned(p, DOUBLE_WORD_SIZE));
  }

  #[test]
  fn zero_byte_malloc_returns_none() {
    let mut a = new_allocator();
    assert!(a.malloc(0).is_none());
  }

  #[test]
  fn free_of_null_is_a_no_op() {
    let mut a = new_allocator();
    a.free(None);
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn heap_extension_on_exhaustion_keeps_existing_pointers_valid() {
    let mut a = new_allocator();
    let mut pointers = Vec::new();
    // Exhaust the first chunk with 1 KiB blocks.
    for _ in 0..(CHUNK_SIZE / 1024 + 4) {
      if let Some(p) = a.malloc(1024) {
        pointers.push(p);
      }
    }
    assert!(pointers.len() > CHUNK_SIZE / 1024, "heap should have extended past one chunk");

    for (i, p) in pointers.iter().enumerate() {
      unsafe {
        p.as_ptr().write((i % 256) as u8);
        assert_eq!(p.as_ptr().read(), (i % 256) as u8);
      }
    }
    assert!(a.check_heap().is_empty());
  }

  #[test]
  fn init_fails_when_provider_refuses_bootstrap_request() {
    let mut heap = FakeHeap::with_capacity(4);
    heap.exhaust();
    assert!(matches!(Allocator::init(heap), Err(InitError::ProviderExhausted)));
  }

  #[test]
  fn malloc_returns_none_on_provider_exhaustion() {
    // Capacity for init's bootstrap and first chunk, but nothing more.
    let mut a = Allocator::init(FakeHeap::with_capacity(8 * WORD_SIZE + CHUNK_SIZE)).unwrap();
    let mut heap_provider_exhausted = false;
    for _ in 0..1_000_000 {
      if a.malloc(CHUNK_SIZE).is_none() {
        heap_provider_exhausted = true;
        break;
      }
    }
    assert!(heap_provider_exhausted, "provider should eventually refuse to extend further");
  }

  /// Bounded random walk over malloc/free/realloc, checking after every
  /// step that the heap is still internally consistent and that every live
  /// block still holds the byte it was last written with.
  #[test]
  fn random_walk_preserves_invariants_and_contents() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut a = new_allocator();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE_u64);
    // (pointer, payload size, byte every live byte was last filled with)
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for step in 0..2000u32 {
      let action = if live.is_empty() { 0 } else { rng.gen_range(0..3) };
      match action {
        0 => {
          let size = rng.gen_range(1..=256);
          if let Some(p) = a.malloc(size) {
            let fill = (step % 256) as u8;
            unsafe { std::ptr::write_bytes(p.as_ptr(), fill, size) };
            live.push((p, size, fill));
          }
        }
        1 => {
          let idx = rng.gen_range(0..live.len());
          let (p, _, _) = live.remove(idx);
          a.free(Some(p));
        }
        _ => {
          let idx = rng.gen_range(0..live.len());
          let (p, old_size, fill) = live[idx];
          let new_size = rng.gen_range(1..=512);
          if let Some(new_p) = a.realloc(Some(p), new_size) {
            let preserved = old_size.min(new_size);
            unsafe {
              for i in 0..preserved {
                assert_eq!(new_p.as_ptr().add(i).read(), fill, "realloc must preserve old contents");
              }
              std::ptr::write_bytes(new_p.as_ptr(), fill, new_size);
            }
            live[idx] = (new_p, new_size, fill);
          }
          // `None` leaves the original block untouched and still live, per
          // realloc's contract, so `live[idx]` is left exactly as it was.
        }
      }

      assert!(a.check_heap().is_empty(), "heap invariants broken at step {step}");
    }

    for (p, size, fill) in &live {
      unsafe {
        for i in 0..*size {
          assert_eq!(p.as_ptr().add(i).read(), *fill);
        }
      }
    }
  }

  /// A violation the checker finds must actually reach a `tracing`
  /// subscriber, not just the returned `Vec`.
  #[test]
  fn check_heap_violations_are_traced() {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
      fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
      }
      fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
      }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedBuf {
      type Writer = SharedBuf;
      fn make_writer(&'a self) -> Self::Writer {
        self.clone()
      }
    }

    let mut a = new_allocator();
    let p = a.malloc(32).unwrap();
    a.free(Some(p));
    // Sabotage the explicit free list so the checker's heap walk (one free
    // block) disagrees with the free list (zero), without touching any
    // heap bytes the other structural checks look at.
    a.free_list_head = None;

    let buf = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
      .with_writer(SharedBuf(buf.clone()))
      .with_ansi(false)
      .finish();

    let violations = tracing::subscriber::with_default(subscriber, || a.check_heap());

    assert!(violations.iter().any(|v| matches!(v, Violation::FreeListCountMismatch { .. })));
    let output = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
    assert!(output.contains("free block count mismatch"), "checker output was: {output}");
  }
}
