use std::io::Read;

use bestfit::{Heap, Mmap};

/// Waits until the user presses ENTER.
/// Useful when you want to read each block table before the next step changes it.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() -> bestfit::Result<()> {
  // Fix the page size so the offsets below are the same on every host.
  let mut heap = Heap::with_reserver(Mmap::with_page_size(4096));

  heap.initialize(4096)?;
  println!("[0] Fresh heap: one free block between the padding and the end marker");
  print!("{}", heap.dump());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate 800 byte blocks until the heap is exhausted.
  //    Each one is carved off the high end of the remaining free block.
  // --------------------------------------------------------------------
  let mut blocks = Vec::new();
  while let Ok(address) = heap.allocate(800) {
    println!("[1] Allocated 800 bytes at {address}");
    blocks.push(address);
  }
  print!("{}", heap.dump());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free two neighbors. The second free merges with the first.
  // --------------------------------------------------------------------
  heap.free(blocks[1])?;
  heap.free(blocks[2])?;
  println!("\n[2] Freed {} and {}", blocks[1], blocks[2]);
  print!("{}", heap.dump());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Neither half alone holds 1600 bytes, the merged block does.
  // --------------------------------------------------------------------
  let big = heap.allocate(1600)?;
  println!("\n[3] Allocated 1600 bytes at {big}");
  print!("{}", heap.dump());

  // --------------------------------------------------------------------
  // 4) Freeing a block twice is refused and changes nothing.
  // --------------------------------------------------------------------
  heap.free(blocks[0])?;
  if let Err(error) = heap.free(blocks[0]) {
    println!("\n[4] Second free of {}: {error}", blocks[0]);
  }

  match heap.check() {
    Ok(()) => println!("[4] All boundary tags are consistent"),
    Err(violation) => println!("[4] Heap is inconsistent: {violation}"),
  }

  println!("\n[5] End of example. The region is unmapped when the heap is dropped.");
  Ok(())
}
