use std::io;

use thiserror::Error;

use crate::Address;

/// Errors reported by [`Heap`](crate::Heap) operations.
///
/// Every variant is a recoverable condition; the heap is left exactly as it
/// was before the failing call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
  /// The requested size is zero, or too large to describe with a block tag.
  #[error("invalid size: {requested} bytes")]
  InvalidSize { requested: usize },

  /// `initialize` already succeeded on this heap.
  #[error("heap is already initialized")]
  AlreadyInitialized,

  /// The reservation collaborator could not supply the region.
  #[error("could not reserve {len} bytes")]
  ReservationFailed {
    len: usize,
    #[source]
    source: io::Error,
  },

  /// No free block can hold the request. A normal negative result.
  #[error("no free block can hold {requested} bytes")]
  OutOfMemory { requested: usize },

  /// The address is null, misaligned, or outside the heap.
  #[error("invalid pointer: {address}")]
  InvalidPointer { address: Address },

  /// The block behind the address is already free.
  #[error("double free of {address}")]
  DoubleFree { address: Address },

  /// The heap has not been initialized yet.
  #[error("heap is not initialized")]
  Uninitialized,
}

/// A specialized `Result` type for heap operations.
pub type Result<T> = std::result::Result<T, Error>;
