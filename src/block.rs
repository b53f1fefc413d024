//! Boundary tags.
//!
//! Every block starts with a one-word header holding its size with two status
//! bits folded into the low end. Free blocks repeat the size, status bits
//! cleared, in a footer occupying their last word.
//!
//! ```text
//!   31                               2   1   0
//!   ┌────────────────────────────────┬───┬───┐
//!   │          size (bytes)          │ p │ a │
//!   └────────────────────────────────┴───┴───┘
//!                                      │   └── this block is allocated
//!                                      └────── the block before it is allocated
//! ```

use crate::align::{DWORD, WORD};

/// Raw value of the zero-size, allocated sentinel that closes the heap.
pub const END_MARK: u32 = 1;

const ALLOCATED: u32 = 0b01;
const PREV_ALLOCATED: u32 = 0b10;
const STATUS: u32 = ALLOCATED | PREV_ALLOCATED;

/// Decoded header of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag {
  pub size: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
}

impl Tag {
  pub fn new(
    size: usize,
    allocated: bool,
    prev_allocated: bool,
  ) -> Self {
    debug_assert_eq!(size % DWORD, 0, "block sizes are double-word multiples");
    Self {
      size,
      allocated,
      prev_allocated,
    }
  }

  pub fn free(
    size: usize,
    prev_allocated: bool,
  ) -> Self {
    Self::new(size, false, prev_allocated)
  }

  /// Packs the tag into its in-memory representation.
  pub fn encode(self) -> u32 {
    // Sizes never exceed the region length, which `Heap::initialize` caps
    // below `u32::MAX`.
    let mut raw = self.size as u32 & !STATUS;
    if self.allocated {
      raw |= ALLOCATED;
    }
    if self.prev_allocated {
      raw |= PREV_ALLOCATED;
    }
    raw
  }

  pub fn decode(raw: u32) -> Self {
    Self {
      size: (raw & !STATUS) as usize,
      allocated: raw & ALLOCATED != 0,
      prev_allocated: raw & PREV_ALLOCATED != 0,
    }
  }

  /// Footer value mirroring this tag: the size alone.
  pub fn footer(self) -> u32 {
    Tag::new(self.size, false, false).encode()
  }
}

pub(crate) fn load(
  bytes: &[u8],
  offset: usize,
) -> u32 {
  let mut word = [0; WORD];
  word.copy_from_slice(&bytes[offset..offset + WORD]);
  u32::from_ne_bytes(word)
}

pub(crate) fn store(
  bytes: &mut [u8],
  offset: usize,
  raw: u32,
) {
  bytes[offset..offset + WORD].copy_from_slice(&raw.to_ne_bytes());
}

pub(crate) fn read_tag(
  bytes: &[u8],
  offset: usize,
) -> Tag {
  Tag::decode(load(bytes, offset))
}

pub(crate) fn write_tag(
  bytes: &mut [u8],
  offset: usize,
  tag: Tag,
) {
  store(bytes, offset, tag.encode());
}

/// Writes a free block: header at `offset`, mirrored footer in its last word.
pub(crate) fn write_free(
  bytes: &mut [u8],
  offset: usize,
  tag: Tag,
) {
  debug_assert!(!tag.allocated);
  write_tag(bytes, offset, tag);
  store(bytes, offset + tag.size - WORD, tag.footer());
}

/// Walks blocks in address order from `start` up to the end marker, yielding
/// each header offset with its decoded tag.
pub(crate) struct Blocks<'a> {
  bytes: &'a [u8],
  offset: usize,
}

impl<'a> Blocks<'a> {
  pub(crate) fn new(
    bytes: &'a [u8],
    start: usize,
  ) -> Self {
    Self { bytes, offset: start }
  }
}

impl Iterator for Blocks<'_> {
  type Item = (usize, Tag);

  fn next(&mut self) -> Option<Self::Item> {
    if self.offset + WORD > self.bytes.len() {
      return None;
    }

    let raw = load(self.bytes, self.offset);
    let tag = Tag::decode(raw);

    // A zero size only shows up at the end marker, or in a corrupted heap
    // where advancing would spin forever.
    if raw == END_MARK || tag.size == 0 {
      return None;
    }

    let offset = self.offset;
    self.offset += tag.size;
    Some((offset, tag))
  }
}
