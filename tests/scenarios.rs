use bestfit::{Address, Error, Heap, Mmap};

fn heap() -> Heap {
  let mut heap = Heap::with_reserver(Mmap::with_page_size(4096));
  heap.initialize(4096).unwrap();
  heap
}

fn assert_consistent(heap: &Heap) {
  if let Err(violation) = heap.check() {
    panic!("{violation}\n{}", heap.dump());
  }

  let dump = heap.dump();
  // Padding word + blocks + end marker cover the whole region.
  assert_eq!(4 + dump.total_size() + 4, heap.region_len());
  for pair in dump.blocks().windows(2) {
    assert!(pair[0].allocated || pair[1].allocated, "adjacent free blocks");
  }
}

/// Allocates 800 byte blocks until the heap runs dry.
fn fill(heap: &mut Heap) -> Vec<Address> {
  let mut blocks = Vec::new();
  loop {
    match heap.allocate(800) {
      Ok(address) => blocks.push(address),
      Err(Error::OutOfMemory { requested: 800 }) => return blocks,
      Err(error) => panic!("unexpected error: {error}"),
    }
  }
}

#[test]
fn sequential_allocations_are_distinct_until_exhausted() {
  let mut heap = heap();

  let blocks = fill(&mut heap);

  // 4088 usable bytes hold five 808 byte blocks.
  assert_eq!(blocks.len(), 5);
  for pair in blocks.windows(2) {
    // Blocks are carved off the high end, so addresses fall.
    assert!(pair[1] < pair[0]);
    assert!(pair[0].offset() - pair[1].offset() >= 808);
  }
  assert!(matches!(heap.allocate(800), Err(Error::OutOfMemory { .. })));
  assert_consistent(&heap);
}

#[test]
fn freeing_adjacent_blocks_makes_room_for_a_larger_one() {
  let mut heap = heap();
  let blocks = fill(&mut heap);

  assert!(matches!(heap.allocate(1600), Err(Error::OutOfMemory { .. })));

  heap.free(blocks[1]).unwrap();
  assert_consistent(&heap);
  heap.free(blocks[2]).unwrap();
  assert_consistent(&heap);

  let merged = heap.allocate(1600).unwrap();

  // The merged block spans both freed blocks; the request lands inside it.
  let start = blocks[2].offset() - 4;
  let end = blocks[1].offset() - 4 + 808;
  assert!(merged.offset() > start && merged.offset() < end);
  assert_eq!(heap.payload(merged).unwrap().len(), 1604);
  assert_consistent(&heap);
}

#[test]
fn freeing_in_reverse_order_also_coalesces() {
  let mut heap = heap();
  let blocks = fill(&mut heap);

  heap.free(blocks[2]).unwrap();
  heap.free(blocks[1]).unwrap();

  heap.allocate(1600).unwrap();
  assert_consistent(&heap);
}

#[test]
fn invalid_frees_do_not_mutate() {
  let mut heap = heap();
  let a = heap.allocate(800).unwrap();
  let before = heap.dump();

  assert!(matches!(
    heap.free(Address::NULL),
    Err(Error::InvalidPointer { .. })
  ));
  assert!(matches!(
    heap.free(Address::from_offset(a.offset() + 2)),
    Err(Error::InvalidPointer { .. })
  ));

  assert_eq!(heap.dump(), before);
}

#[test]
fn double_free_is_rejected_and_changes_nothing() {
  let mut heap = heap();
  let blocks = fill(&mut heap);
  heap.free(blocks[3]).unwrap();
  let after_first = heap.dump();

  assert!(matches!(
    heap.free(blocks[3]),
    Err(Error::DoubleFree { .. })
  ));

  assert_eq!(heap.dump(), after_first);
  assert_consistent(&heap);
}

#[test]
fn returned_addresses_are_double_word_aligned() {
  let mut heap = heap();

  for size in [1, 3, 4, 5, 7, 8, 9, 13, 24, 100, 255, 256] {
    let address = heap.allocate(size).unwrap();
    assert_eq!(address.offset() % 8, 0);
    assert_eq!(heap.as_ptr(address).unwrap().as_ptr() as usize % 8, 0);
    assert!(heap.payload(address).unwrap().len() >= size);
  }

  assert_consistent(&heap);
}

#[test]
fn best_fit_picks_the_tightest_block() {
  let mut heap = heap();
  let loose = heap.allocate(812).unwrap();
  let _guard = heap.allocate(100).unwrap();
  let tight = heap.allocate(796).unwrap();
  let _guard = heap.allocate(100).unwrap();
  heap.free(loose).unwrap();
  heap.free(tight).unwrap();

  let sizes: Vec<_> = heap
    .dump()
    .iter()
    .filter(|block| !block.allocated)
    .map(|block| block.size)
    .collect();
  assert_eq!(sizes, vec![2264, 800, 816]);

  assert_eq!(heap.allocate(796).unwrap(), tight);
  assert_consistent(&heap);
}

#[test]
fn reused_blocks_keep_neighbors_intact() {
  let mut heap = heap();
  let blocks = fill(&mut heap);

  for (i, address) in blocks.iter().enumerate() {
    heap.payload_mut(*address).unwrap().fill(i as u8 + 1);
  }

  heap.free(blocks[2]).unwrap();
  let again = heap.allocate(800).unwrap();
  heap.payload_mut(again).unwrap().fill(0xee);

  for (i, address) in blocks.iter().enumerate() {
    if *address == again {
      continue;
    }
    let payload = heap.payload(*address).unwrap();
    assert!(payload.iter().all(|byte| *byte == i as u8 + 1), "block {i}");
  }
  assert_consistent(&heap);
}

#[test]
fn freeing_everything_restores_one_block() {
  let mut heap = heap();
  let mut blocks = Vec::new();

  // Mixed sizes, freed in an interleaved order.
  for size in [24, 500, 8, 1000, 64, 300, 16, 900] {
    blocks.push(heap.allocate(size).unwrap());
  }
  assert_consistent(&heap);

  for i in [1, 3, 5, 7, 0, 2, 4, 6] {
    heap.free(blocks[i]).unwrap();
    assert_consistent(&heap);
  }

  let dump = heap.dump();
  assert_eq!(dump.len(), 1);
  assert_eq!(dump.free_size(), 4088);
  assert_eq!(heap.allocate(4084).unwrap().offset(), 8);
}

#[test]
fn churn_preserves_invariants() {
  let mut heap = Heap::with_reserver(Mmap::with_page_size(4096));
  heap.initialize(16 * 1024).unwrap();

  let mut live = Vec::new();
  // Deterministic pseudo-random sizes and free order.
  let mut seed: u32 = 0x2545_f491;
  let mut next = || {
    seed ^= seed << 13;
    seed ^= seed >> 17;
    seed ^= seed << 5;
    seed
  };

  for _ in 0..500 {
    let roll = next();
    if roll % 3 == 0 && !live.is_empty() {
      let index = next() as usize % live.len();
      let address = live.swap_remove(index);
      heap.free(address).unwrap();
    } else {
      match heap.allocate(roll as usize % 700 + 1) {
        Ok(address) => live.push(address),
        Err(Error::OutOfMemory { .. }) => {}
        Err(error) => panic!("unexpected error: {error}"),
      }
    }
    assert_consistent(&heap);
  }

  for address in live {
    heap.free(address).unwrap();
  }
  assert_eq!(heap.dump().len(), 1);
  assert_consistent(&heap);
}
