//! Heap consistency checks.
//!
//! Walks the region independently of the end marker so that a damaged heap is
//! reported instead of traversed out of bounds.

use thiserror::Error;

use crate::{
  Heap,
  align::{DWORD, WORD},
  block::{END_MARK, Tag, load},
  heap::FIRST,
  region::Reserve,
};

/// The first broken invariant found by [`Heap::check`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Violation {
  #[error("heap is not initialized")]
  Uninitialized,

  #[error("block at {offset:#x} has size {size}, not a positive multiple of 8")]
  BadSize { offset: usize, size: usize },

  #[error("block at {offset:#x} runs {size} bytes past the end marker")]
  Overrun { offset: usize, size: usize },

  #[error("block at {offset:#x} records prev_allocated = {recorded}, but its predecessor says {actual}")]
  PrevMismatch {
    offset: usize,
    recorded: bool,
    actual: bool,
  },

  #[error("free block at {offset:#x} has size {size} but footer {footer}")]
  FooterMismatch { offset: usize, size: usize, footer: u32 },

  #[error("free blocks at {left:#x} and {right:#x} are adjacent")]
  AdjacentFree { left: usize, right: usize },

  #[error("end marker holds {raw:#x}")]
  EndMark { raw: u32 },
}

impl<R: Reserve> Heap<R> {
  /// Verifies every boundary tag: sizes tile the region exactly up to the end
  /// marker, prev bits mirror their predecessors, free blocks carry matching
  /// footers and are never adjacent.
  pub fn check(&self) -> Result<(), Violation> {
    let bytes = self.bytes().ok_or(Violation::Uninitialized)?;
    let end = bytes.len() - WORD;

    let mut offset = FIRST;
    // The padding word in front reads as an allocated predecessor.
    let mut prev = Tag::new(0, true, true);
    let mut prev_offset = 0;

    while offset < end {
      let tag = Tag::decode(load(bytes, offset));

      if tag.size == 0 || tag.size % DWORD != 0 {
        return Err(Violation::BadSize {
          offset,
          size: tag.size,
        });
      }

      if tag.size > end - offset {
        return Err(Violation::Overrun {
          offset,
          size: tag.size,
        });
      }

      if tag.prev_allocated != prev.allocated {
        return Err(Violation::PrevMismatch {
          offset,
          recorded: tag.prev_allocated,
          actual: prev.allocated,
        });
      }

      if !tag.allocated {
        let footer = load(bytes, offset + tag.size - WORD);
        if footer != tag.footer() {
          return Err(Violation::FooterMismatch {
            offset,
            size: tag.size,
            footer,
          });
        }

        if !prev.allocated {
          return Err(Violation::AdjacentFree {
            left: prev_offset,
            right: offset,
          });
        }
      }

      prev = tag;
      prev_offset = offset;
      offset += tag.size;
    }

    let raw = load(bytes, end);
    if raw != END_MARK {
      return Err(Violation::EndMark { raw });
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{Mmap, block::store};

  fn heap() -> Heap {
    let mut heap = Heap::with_reserver(Mmap::with_page_size(4096));
    heap.initialize(4096).unwrap();
    heap
  }

  /// Overwrites one word of the region, bypassing the engine.
  fn poke(
    heap: &mut Heap,
    offset: usize,
    raw: u32,
  ) {
    store(heap.bytes_mut().unwrap(), offset, raw);
  }

  #[test]
  fn test_fresh_heap_is_consistent() {
    assert_eq!(heap().check(), Ok(()));
  }

  #[test]
  fn test_uninitialized() {
    assert_eq!(Heap::new().check(), Err(Violation::Uninitialized));
  }

  #[test]
  fn test_detects_broken_end_mark() {
    let mut heap = heap();
    poke(&mut heap, 4092, 3);

    assert_eq!(heap.check(), Err(Violation::EndMark { raw: 3 }));
  }

  #[test]
  fn test_detects_footer_mismatch() {
    let mut heap = heap();
    poke(&mut heap, 4088, 16);

    assert_eq!(
      heap.check(),
      Err(Violation::FooterMismatch {
        offset: 4,
        size: 4088,
        footer: 16
      })
    );
  }

  #[test]
  fn test_detects_prev_mismatch() {
    let mut heap = heap();
    heap.allocate(800).unwrap();
    poke(&mut heap, 3284, Tag::new(808, true, true).encode());

    assert_eq!(
      heap.check(),
      Err(Violation::PrevMismatch {
        offset: 3284,
        recorded: true,
        actual: false
      })
    );

    poke(&mut heap, 3284, Tag::new(808, true, false).encode());

    assert_eq!(heap.check(), Ok(()));
  }

  #[test]
  fn test_detects_adjacent_free_blocks() {
    let mut heap = heap();
    // Split the single free block into two free halves by hand.
    poke(&mut heap, 4, Tag::free(2048, true).encode());
    poke(&mut heap, 2048, 2048);
    poke(&mut heap, 2052, Tag::free(2040, false).encode());
    poke(&mut heap, 4088, 2040);

    assert_eq!(
      heap.check(),
      Err(Violation::AdjacentFree {
        left: 4,
        right: 2052
      })
    );
  }

  #[test]
  fn test_detects_bad_sizes() {
    let mut heap = heap();
    poke(&mut heap, 4, Tag::free(0, true).encode());

    assert_eq!(heap.check(), Err(Violation::BadSize { offset: 4, size: 0 }));

    poke(&mut heap, 4, Tag::free(8192, true).encode());

    assert_eq!(
      heap.check(),
      Err(Violation::Overrun {
        offset: 4,
        size: 8192
      })
    );
  }
}
