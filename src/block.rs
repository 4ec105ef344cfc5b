use std::{mem, ptr};

use crate::align;

/// Header written in front of every region carved out of the arena.
///
/// ```text
///   ┌──────────────────────────┬──────────────────────────────┐
///   │ size │ next │ prev │ payload │ is_free │   size bytes  │
///   └──────────────────────────┴──────────────────────────────┘
///   ▲                          ▲
///   block                      payload (returned to the caller)
/// ```
#[repr(C)]
pub struct Block {
  pub size: usize,
  pub next: *mut Block,
  pub prev: *mut Block,
  /// Payload address recorded when the block was carved. Cleared when the
  /// header is absorbed by a merge.
  pub payload: *mut u8,
  pub is_free: bool,
}

pub const HEADER_SIZE: usize = align!(mem::size_of::<Block>());

impl Block {
  pub fn new(
    size: usize,
    is_free: bool,
    prev: *mut Block,
    next: *mut Block,
  ) -> Self {
    Self {
      size,
      next,
      prev,
      payload: ptr::null_mut(),
      is_free,
    }
  }

  /// Writes a header at `at` and records its payload address.
  ///
  /// # Safety
  ///
  /// `at` must be word aligned and valid for writes of `HEADER_SIZE + size`
  /// bytes owned by the allocator.
  pub unsafe fn write(
    at: *mut u8,
    size: usize,
    is_free: bool,
    prev: *mut Block,
    next: *mut Block,
  ) -> *mut Block {
    let block = at as *mut Block;
    unsafe {
      block.write(Block::new(size, is_free, prev, next));
      (*block).payload = at.add(HEADER_SIZE);
    }
    block
  }

  /// Address handed out to the caller for `block`.
  pub fn payload_of(block: *mut Block) -> *mut u8 {
    (block as *mut u8).wrapping_add(HEADER_SIZE)
  }

  /// Header address for a payload pointer. Does not check anything.
  pub fn from_payload(payload: *mut u8) -> *mut Block {
    payload.wrapping_sub(HEADER_SIZE) as *mut Block
  }

  /// First byte past the payload of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { Block::payload_of(block).add((*block).size) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::WORD;

  #[test]
  fn test_header_is_word_aligned() {
    assert_eq!(HEADER_SIZE % WORD, 0);
    assert!(HEADER_SIZE >= mem::size_of::<Block>());
  }

  #[test]
  fn test_payload_translation() {
    let mut buffer = vec![0usize; 32];
    let at = buffer.as_mut_ptr() as *mut u8;

    unsafe {
      let block = Block::write(at, 64, false, ptr::null_mut(), ptr::null_mut());
      let payload = Block::payload_of(block);

      assert_eq!(payload, at.add(HEADER_SIZE));
      assert_eq!((*block).payload, payload);
      assert_eq!(Block::from_payload(payload), block);
      assert_eq!(Block::end(block), payload.add(64));
      assert!(!(*block).is_free);
    }
  }
}
