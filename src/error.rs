use thiserror::Error;

/// Failures surfaced by `allocate`, `resize`, `zero_allocate` and strategy
/// parsing. `free` never reports one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
  /// The program break could not be moved far enough.
  #[error("out of memory: could not grow the arena by {requested} bytes")]
  OutOfMemory { requested: usize },

  /// The pointer was not handed out by this allocator, or was already freed.
  #[error("invalid pointer {address:#x}")]
  InvalidPointer { address: usize },

  /// A size computation overflowed `usize`.
  #[error("requested size overflows the address space")]
  SizeOverflow,

  #[error("unsupported: {0}")]
  Unsupported(String),
}
