//! Process-wide heap with a C-style interface.
//!
//! One [`Heap`] lives behind a mutex for the whole process. Sizes are signed
//! and failures collapse to `-1` or a null pointer; the reason is logged.

use std::{
  ptr,
  sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::warn;

use crate::Heap;

static HEAP: Mutex<Option<Heap>> = Mutex::new(None);

fn lock() -> MutexGuard<'static, Option<Heap>> {
  HEAP.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reserves the process heap. Succeeds at most once per process.
///
/// Returns 0 on success and -1 on failure.
pub fn init(size: i32) -> i32 {
  let mut slot = lock();
  let heap = slot.get_or_insert_with(Heap::new);

  // Negative sizes fail the same way zero does.
  match heap.initialize(usize::try_from(size).unwrap_or(0)) {
    Ok(()) => 0,
    Err(error) => {
      warn!(size, %error, "init failed");
      -1
    }
  }
}

/// Allocates `size` bytes from the process heap, or returns null.
pub fn alloc(size: i32) -> *mut u8 {
  let mut slot = lock();
  let Some(heap) = slot.as_mut() else {
    warn!(size, "alloc before init");
    return ptr::null_mut();
  };

  let address = match heap.allocate(usize::try_from(size).unwrap_or(0)) {
    Ok(address) => address,
    Err(error) => {
      warn!(size, %error, "alloc failed");
      return ptr::null_mut();
    }
  };

  heap
    .as_ptr(address)
    .map_or(ptr::null_mut(), |ptr| ptr.as_ptr())
}

/// Frees a pointer returned by [`alloc`].
///
/// Returns 0 on success and -1 on failure.
pub fn free(ptr: *mut u8) -> i32 {
  let mut slot = lock();
  let Some(heap) = slot.as_mut() else {
    warn!(?ptr, "free before init");
    return -1;
  };

  let address = heap.address_of(ptr);
  match heap.free(address) {
    Ok(()) => 0,
    Err(error) => {
      warn!(?ptr, %error, "free failed");
      -1
    }
  }
}

/// Prints the process heap's block table to stdout.
pub fn dump() {
  let slot = lock();
  if let Some(heap) = slot.as_ref() {
    print!("{}", heap.dump());
  }
}
