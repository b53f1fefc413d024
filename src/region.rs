use std::{
  fmt, io,
  ops::{Deref, DerefMut},
  ptr::{self, NonNull},
  slice,
};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, _SC_PAGESIZE};

/// Supplies the one contiguous span of memory a heap manages.
///
/// Implementations hand out zero-filled, writable, page-aligned memory of
/// exactly the requested length, or fail.
pub trait Reserve {
  /// Granularity the requested heap size is rounded up to.
  fn page_size(&self) -> usize;

  fn reserve(
    &mut self,
    len: usize,
  ) -> io::Result<Region>;
}

/// Reserves memory with an anonymous private `mmap(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mmap {
  page_size: Option<usize>,
}

impl Mmap {
  /// Rounds reservations to `page_size` instead of the system page size.
  ///
  /// `page_size` must be a non-zero multiple of 8.
  pub fn with_page_size(page_size: usize) -> Self {
    Self {
      page_size: Some(page_size),
    }
  }
}

impl Reserve for Mmap {
  fn page_size(&self) -> usize {
    self.page_size.unwrap_or_else(system_page_size)
  }

  fn reserve(
    &mut self,
    len: usize,
  ) -> io::Result<Region> {
    Region::map(len)
  }
}

fn system_page_size() -> usize {
  // SAFETY: `sysconf` only reads a configuration value.
  let size = unsafe { libc::sysconf(_SC_PAGESIZE) };
  usize::try_from(size).unwrap_or(4096)
}

/// An owned, mapped byte span. Unmapped on drop.
pub struct Region {
  base: NonNull<u8>,
  len: usize,
}

// SAFETY: the mapping is private to this value and only reachable through
// `&self` / `&mut self`, so moving it across threads is sound.
unsafe impl Send for Region {}

impl Region {
  /// Maps `len` zero-filled, writable, page-aligned bytes with an anonymous
  /// private `mmap(2)`. The mapping belongs to the returned value.
  ///
  /// Custom [`Reserve`] implementations build their regions with this.
  pub fn map(len: usize) -> io::Result<Self> {
    if len == 0 {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "cannot map an empty region",
      ));
    }

    // SAFETY: a fresh anonymous mapping aliases no existing memory.
    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(io::Error::last_os_error());
    }

    let base = NonNull::new(address.cast::<u8>())
      .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;

    Ok(Self { base, len })
  }

  /// Address of the first byte.
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }
}

impl Deref for Region {
  type Target = [u8];

  fn deref(&self) -> &[u8] {
    // SAFETY: `base` points to `len` mapped, readable bytes owned by `self`.
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
  }
}

impl DerefMut for Region {
  fn deref_mut(&mut self) -> &mut [u8] {
    // SAFETY: as above, and `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    // SAFETY: `base` and `len` describe the mapping created in `map`, and no
    // borrow of it can outlive `self`.
    unsafe {
      libc::munmap(self.base.as_ptr().cast(), self.len);
    }
  }
}

impl fmt::Debug for Region {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Region")
      .field("base", &self.base)
      .field("len", &self.len)
      .finish()
  }
}
