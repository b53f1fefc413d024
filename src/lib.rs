//! # bestfit - A Boundary-Tag Heap Allocator
//!
//! This crate provides a **best-fit** allocator that manages one fixed-size
//! region of memory, reserved once with `mmap(2)`, for the lifetime of its
//! owner.
//!
//! ## Overview
//!
//! The heap keeps no index of its free blocks. Every block describes itself
//! with a one-word header, and free blocks repeat their size in a footer:
//!
//! ```text
//!   Heap Region:
//!
//!   ┌────┬────────────────┬───────────────┬────────────────┬────────┬─────┐
//!   │pad │  free   3280   │  busy   808   │  free   808    │ busy … │ end │
//!   └────┴────────────────┴───────────────┴────────────────┴────────┴─────┘
//!   ▲    ▲                                                          ▲
//!   │    └── first block (always 4 mod 8, so payloads are 0 mod 8)  │
//!   └── page aligned base                              end marker (raw 1)
//!
//!   Walking from the first block, header to header, visits every block in
//!   address order. That walk is the free list.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   bestfit
//!   ├── align      - Alignment macros (align!, align_to!) and word sizes
//!   ├── block      - Boundary-tag codec and block walker (internal)
//!   ├── region     - Memory reservation (Reserve, Mmap, Region)
//!   ├── heap       - Heap engine: initialize, allocate, free
//!   ├── dump       - Block table snapshots
//!   ├── check      - Invariant verification
//!   └── global     - Process-wide heap with a C-style interface
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bestfit::Heap;
//!
//! let mut heap = Heap::new();
//! heap.initialize(4096)?;
//!
//! let address = heap.allocate(800)?;
//! heap.payload_mut(address).unwrap().fill(0xab);
//!
//! print!("{}", heap.dump());
//!
//! heap.free(address)?;
//! # Ok::<(), bestfit::Error>(())
//! ```
//!
//! ## How It Works
//!
//! Each header packs the block size with two status bits:
//!
//! ```text
//!   ┌───────────────────────────────┬───┬───┐
//!   │          size (bytes)         │ p │ a │   a: block is allocated
//!   └───────────────────────────────┴───┴───┘   p: previous block is allocated
//! ```
//!
//! Allocating scans every block for the free one that leaves the least space
//! over, then carves the request off its high end:
//!
//! ```text
//!   Before:  ┌──────────────── free 1616 ────────────────┐
//!   After:   ┌── free 8 ──┬──────── busy 1608 ──────────┐
//!                         ▲
//!                         └── header + 4 returned to the caller
//! ```
//!
//! Freeing reads the `p` bit and the next header to find free neighbors in
//! constant time, and merges them so no two free blocks are ever adjacent:
//!
//! ```text
//!   ┌─ free ─┬─ freed ─┬─ free ─┐   →   ┌──────── free ────────┐
//!         footer ▲        ▲ header
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded**: a `Heap` does no locking; wrap it in a mutex to share it
//! - **Fixed size**: the region never grows and is released only on drop
//! - **Trusting**: metadata is not validated beyond null, alignment, bounds
//!   and double-free checks on `free`
//! - **Unix-only**: requires `libc` and `mmap`

pub mod align;
mod block;
mod check;
mod dump;
mod error;
pub mod global;
mod heap;
mod region;

pub use check::Violation;
pub use dump::{BlockDescriptor, Dump};
pub use error::{Error, Result};
pub use heap::{Address, Heap};
pub use region::{Mmap, Region, Reserve};
