/// Size of one boundary tag (header or footer) in bytes.
pub const WORD: usize = 4;

/// Block sizes and payload addresses are multiples of this.
pub const DWORD: usize = 2 * WORD;

/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two.
///
/// # Examples
///
/// ```rust
/// use bestfit::align_to;
///
/// assert_eq!(align_to!(13, 4), 16);
/// assert_eq!(align_to!(16, 8), 16);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Rounds `value` up to the double-word boundary every block size obeys.
///
/// # Examples
///
/// ```rust
/// use bestfit::align;
///
/// assert_eq!(align!(804), 808);
/// assert_eq!(align!(808), 808);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::DWORD)
  };
}

/// Total block size needed to serve a payload of `payload` bytes: the payload
/// rounded to a word, plus the header, rounded to a double word.
///
/// Returns `None` when the computation overflows.
pub(crate) fn block_size(payload: usize) -> Option<usize> {
  // Both roundings and the header add at most this much.
  payload.checked_add((WORD - 1) + WORD + (DWORD - 1))?;
  Some(align!(align_to!(payload, WORD) + WORD))
}
