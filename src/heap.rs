use std::{fmt, ptr::NonNull};

use tracing::{debug, trace};

use crate::{
  Error, Result,
  align::{DWORD, WORD, block_size},
  block::{Blocks, END_MARK, Tag, load, read_tag, store, write_free, write_tag},
  dump::{BlockDescriptor, Dump},
  region::{Mmap, Region, Reserve},
};

/// Offset of the first block header. The word before it pads the heap so
/// that every payload lands on a double word.
pub(crate) const FIRST: usize = WORD;

/// Largest region whose block sizes still fit a tag.
const MAX_REGION: usize = (u32::MAX as usize) & !(DWORD - 1);

/// Location of a payload, as a byte offset from the start of the region.
///
/// Offset zero is never a payload and doubles as the null address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address {
  pub const NULL: Address = Address(0);

  pub fn from_offset(offset: usize) -> Self {
    Self(offset)
  }

  pub fn offset(self) -> usize {
    self.0
  }

  pub fn is_null(self) -> bool {
    self.0 == 0
  }
}

impl fmt::Display for Address {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    if self.is_null() {
      f.write_str("null")
    } else {
      write!(f, "+{:#x}", self.0)
    }
  }
}

/// A best-fit heap over one region reserved at [`initialize`](Heap::initialize).
///
/// ```text
///   ┌─────┬────────────┬────────────────┬────────────┬─────┐
///   │ pad │ free block │ busy block     │ free block │ end │
///   │     │ hdr … ftr  │ hdr, payload   │ hdr … ftr  │     │
///   └─────┴────────────┴────────────────┴────────────┴─────┘
///   0     4                                          len-4
/// ```
///
/// The heap is single threaded. Share it across threads only behind a lock.
#[derive(Debug)]
pub struct Heap<R: Reserve = Mmap> {
  reserver: R,
  region: Option<Region>,
}

impl Heap {
  pub fn new() -> Self {
    Self::with_reserver(Mmap::default())
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}

impl<R: Reserve> Heap<R> {
  pub fn with_reserver(reserver: R) -> Self {
    Self {
      reserver,
      region: None,
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.region.is_some()
  }

  /// Length of the reserved region, or zero before initialization.
  pub fn region_len(&self) -> usize {
    self.region.as_ref().map_or(0, |region| region.len())
  }

  /// Reserves a region of at least `requested` bytes, rounded up to the
  /// reserver's page size, and lays it out as a single free block.
  pub fn initialize(
    &mut self,
    requested: usize,
  ) -> Result<()> {
    if self.region.is_some() {
      return Err(Error::AlreadyInitialized);
    }

    if requested == 0 {
      return Err(Error::InvalidSize { requested });
    }

    let page_size = self.reserver.page_size();
    let len = requested
      .checked_next_multiple_of(page_size)
      .filter(|len| (2 * DWORD..=MAX_REGION).contains(len) && len % DWORD == 0)
      .ok_or(Error::InvalidSize { requested })?;

    let mut region = self
      .reserver
      .reserve(len)
      .map_err(|source| Error::ReservationFailed { len, source })?;

    // One word of padding in front and one for the end marker.
    let size = len - DWORD;
    write_free(&mut region, FIRST, Tag::free(size, true));
    store(&mut region, FIRST + size, END_MARK);

    debug!(requested, len, page_size, "heap initialized");

    self.region = Some(region);
    Ok(())
  }

  /// Hands out a block with room for `requested` payload bytes, choosing the
  /// free block that leaves the least space over.
  pub fn allocate(
    &mut self,
    requested: usize,
  ) -> Result<Address> {
    let bytes = self.bytes_mut()?;

    if requested == 0 {
      debug!(requested, "rejected empty allocation");
      return Err(Error::InvalidSize { requested });
    }

    let Some(need) = block_size(requested) else {
      debug!(requested, "allocation size overflows");
      return Err(Error::OutOfMemory { requested });
    };

    let Some((block, tag)) = find_best_fit(bytes, need) else {
      debug!(requested, need, "no free block large enough");
      return Err(Error::OutOfMemory { requested });
    };

    let placed = split(bytes, block, tag, need);

    Ok(Address(placed + WORD))
  }

  /// Returns the block behind `address` to the heap, merging it with free
  /// neighbors.
  ///
  /// Only null, misaligned, out-of-region and already-free addresses are
  /// detected. Freeing anything else that `allocate` did not return corrupts
  /// the heap and may panic.
  pub fn free(
    &mut self,
    address: Address,
  ) -> Result<()> {
    if address.is_null() {
      debug!(%address, "rejected free of null pointer");
      return Err(Error::InvalidPointer { address });
    }

    let bytes = self.bytes_mut()?;

    if address.0 % DWORD != 0 || address.0 >= bytes.len() {
      debug!(%address, "rejected free of invalid pointer");
      return Err(Error::InvalidPointer { address });
    }

    let header = address.0 - WORD;
    let tag = read_tag(bytes, header);

    if !tag.allocated {
      debug!(%address, "rejected double free");
      return Err(Error::DoubleFree { address });
    }

    coalesce(bytes, header, tag);
    Ok(())
  }

  /// Snapshot of every block, in address order.
  pub fn dump(&self) -> Dump {
    let Some(region) = &self.region else {
      return Dump::default();
    };

    let blocks = Blocks::new(region, FIRST)
      .enumerate()
      .map(|(index, (offset, tag))| BlockDescriptor {
        index: index + 1,
        allocated: tag.allocated,
        prev_allocated: tag.prev_allocated,
        start: offset,
        end: offset + tag.size - 1,
        size: tag.size,
      })
      .collect();

    Dump::new(region.base().as_ptr() as usize, blocks)
  }

  /// Payload bytes of the allocated block at `address`.
  pub fn payload(
    &self,
    address: Address,
  ) -> Option<&[u8]> {
    let region = self.region.as_ref()?;
    let range = payload_range(region, address)?;
    Some(&region[range])
  }

  pub fn payload_mut(
    &mut self,
    address: Address,
  ) -> Option<&mut [u8]> {
    let region = self.region.as_mut()?;
    let range = payload_range(region, address)?;
    Some(&mut region[range])
  }

  /// Raw pointer to `address`, or `None` if it is null or outside the region.
  pub fn as_ptr(
    &self,
    address: Address,
  ) -> Option<NonNull<u8>> {
    let region = self.region.as_ref()?;
    if address.is_null() || address.0 >= region.len() {
      return None;
    }
    // SAFETY: the offset was just checked to lie inside the mapping.
    Some(unsafe { region.base().add(address.0) })
  }

  /// Inverse of [`as_ptr`](Heap::as_ptr). Pointers outside the region map to
  /// [`Address::NULL`].
  pub fn address_of(
    &self,
    ptr: *const u8,
  ) -> Address {
    let Some(region) = &self.region else {
      return Address::NULL;
    };

    (ptr as usize)
      .checked_sub(region.base().as_ptr() as usize)
      .filter(|offset| *offset < region.len())
      .map_or(Address::NULL, Address)
  }

  pub(crate) fn bytes(&self) -> Option<&[u8]> {
    self.region.as_deref()
  }

  pub(crate) fn bytes_mut(&mut self) -> Result<&mut [u8]> {
    self.region.as_deref_mut().ok_or(Error::Uninitialized)
  }
}

fn payload_range(
  bytes: &[u8],
  address: Address,
) -> Option<std::ops::Range<usize>> {
  if address.is_null() || address.0 % DWORD != 0 || address.0 >= bytes.len() {
    return None;
  }

  let tag = read_tag(bytes, address.0 - WORD);
  let end = address.0 - WORD + tag.size;
  (tag.allocated && tag.size >= DWORD && end <= bytes.len()).then_some(address.0..end)
}

/// Scans every block and returns the free one that leaves the least space
/// over after carving `need` bytes. Ties go to the lowest address.
fn find_best_fit(
  bytes: &[u8],
  need: usize,
) -> Option<(usize, Tag)> {
  let mut best: Option<(usize, Tag)> = None;

  for (offset, tag) in Blocks::new(bytes, FIRST) {
    if tag.allocated || tag.size < need {
      continue;
    }

    if best.is_none_or(|(_, current)| tag.size < current.size) {
      best = Some((offset, tag));
    }

    if tag.size == need {
      break;
    }
  }

  best
}

/// Carves `need` bytes off the high end of the free block at `block` and
/// returns the header offset of the allocated piece.
fn split(
  bytes: &mut [u8],
  block: usize,
  tag: Tag,
  need: usize,
) -> usize {
  let next = block + tag.size;
  let leftover = tag.size - need;

  let placed = if leftover == 0 {
    write_tag(bytes, block, Tag { allocated: true, ..tag });
    block
  } else {
    // The first block has no real predecessor; it always reads as allocated.
    let remainder = Tag::free(leftover, block == FIRST || tag.prev_allocated);
    write_free(bytes, block, remainder);

    let placed = block + leftover;
    write_tag(bytes, placed, Tag::new(need, true, remainder.allocated));
    placed
  };

  // The old footer now sits inside the payload.
  store(bytes, next - WORD, 0);
  set_prev_allocated(bytes, next, true);

  trace!(block, size = tag.size, need, leftover, placed, "split block");

  placed
}

/// Frees the allocated block at `header` and folds free neighbors into it.
fn coalesce(
  bytes: &mut [u8],
  header: usize,
  tag: Tag,
) {
  let mut start = header;
  let mut size = tag.size;
  let mut prev_allocated = tag.prev_allocated;

  if !tag.prev_allocated {
    let footer = header - WORD;
    let left = load(bytes, footer) as usize;

    store(bytes, footer, 0);
    store(bytes, header, 0);

    start = header - left;
    prev_allocated = read_tag(bytes, start).prev_allocated;
    size += left;
  }

  let right = header + tag.size;
  let raw = load(bytes, right);
  if raw != END_MARK {
    let neighbor = Tag::decode(raw);
    if neighbor.allocated {
      write_tag(
        bytes,
        right,
        Tag {
          prev_allocated: false,
          ..neighbor
        },
      );
    } else {
      store(bytes, right, 0);
      size += neighbor.size;
    }
  }

  write_free(bytes, start, Tag::free(size, prev_allocated));

  trace!(header, start, size, "coalesced block");
}

fn set_prev_allocated(
  bytes: &mut [u8],
  offset: usize,
  prev_allocated: bool,
) {
  let raw = load(bytes, offset);
  if raw == END_MARK {
    return;
  }

  write_tag(
    bytes,
    offset,
    Tag {
      prev_allocated,
      ..Tag::decode(raw)
    },
  );
}
