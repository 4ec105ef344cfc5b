use std::mem;

/// The allocator's alignment unit: one machine word.
pub const WORD: usize = mem::size_of::<usize>();

/// Calculates the machine word alignment for the given size.
///
/// The macro form does not check for overflow and is meant for constants and
/// sizes already known to be small. Request sizes go through [`align_up`].
///
/// # Examples
///
/// ```rust
/// use brkalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the next multiple of [`WORD`], or `None` when that
/// would overflow.
///
/// ```rust
/// use brkalloc::align::{align_up, WORD};
///
/// assert_eq!(align_up(1), Some(WORD));
/// assert_eq!(align_up(usize::MAX), None);
/// ```
pub const fn align_up(value: usize) -> Option<usize> {
  match value.checked_add(WORD - 1) {
    Some(padded) => Some(padded & !(WORD - 1)),
    None => None,
  }
}

/// Rounds `value` up to a multiple of `to`, which need not be a power of two.
pub(crate) const fn round_up(
  value: usize,
  to: usize,
) -> Option<usize> {
  match value.checked_add(to - 1) {
    Some(padded) => Some(padded / to * to),
    None => None,
  }
}
