use std::{fmt, slice};

/// One row of a heap dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockDescriptor {
  /// Position in address order, starting at 1.
  pub index: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
  /// Offset of the header.
  pub start: usize,
  /// Offset of the last byte, inclusive.
  pub end: usize,
  /// Size including header and footer.
  pub size: usize,
}

/// Read-only snapshot of a heap's blocks, in address order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dump {
  base: usize,
  blocks: Vec<BlockDescriptor>,
}

impl Dump {
  pub(crate) fn new(
    base: usize,
    blocks: Vec<BlockDescriptor>,
  ) -> Self {
    Self { base, blocks }
  }

  pub fn blocks(&self) -> &[BlockDescriptor] {
    &self.blocks
  }

  pub fn iter(&self) -> slice::Iter<'_, BlockDescriptor> {
    self.blocks.iter()
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  pub fn busy_size(&self) -> usize {
    self.sum(true)
  }

  pub fn free_size(&self) -> usize {
    self.sum(false)
  }

  pub fn total_size(&self) -> usize {
    self.blocks.iter().map(|block| block.size).sum()
  }

  fn sum(
    &self,
    allocated: bool,
  ) -> usize {
    self
      .blocks
      .iter()
      .filter(|block| block.allocated == allocated)
      .map(|block| block.size)
      .sum()
  }
}

impl<'a> IntoIterator for &'a Dump {
  type Item = &'a BlockDescriptor;
  type IntoIter = slice::Iter<'a, BlockDescriptor>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

fn status(allocated: bool) -> &'static str {
  if allocated { "Busy" } else { "Free" }
}

impl fmt::Display for Dump {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let rule = "-".repeat(72);
    let stars = "*".repeat(72);

    writeln!(f, "{stars}")?;
    writeln!(f, "No.\tStatus\tPrev\tBegin\t\tEnd\t\tSize")?;
    writeln!(f, "{rule}")?;

    for block in &self.blocks {
      writeln!(
        f,
        "{}\t{}\t{}\t{:#010x}\t{:#010x}\t{}",
        block.index,
        status(block.allocated),
        status(block.prev_allocated),
        self.base + block.start,
        self.base + block.end,
        block.size,
      )?;
    }

    writeln!(f, "{rule}")?;
    writeln!(f, "Total busy size = {}", self.busy_size())?;
    writeln!(f, "Total free size = {}", self.free_size())?;
    writeln!(f, "Total size = {}", self.total_size())?;
    writeln!(f, "{stars}")
  }
}
