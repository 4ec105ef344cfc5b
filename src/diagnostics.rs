//! Counters and invariant checks over the block directory.

use thiserror::Error;

use crate::{align::WORD, block::Block, directory::Directory};

/// Running counters for external analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Stats {
  pub allocations: usize,
  pub frees: usize,
  pub splits: usize,
  pub merges: usize,
  pub grows: usize,
  pub shrinks: usize,
}

impl Stats {
  pub const fn new() -> Self {
    Self {
      allocations: 0,
      frees: 0,
      splits: 0,
      merges: 0,
      grows: 0,
      shrinks: 0,
    }
  }
}

/// A broken directory invariant, found by [`verify`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
  #[error("head block {block:#x} has a predecessor")]
  HeadHasPrev { block: usize },

  #[error("tail block {block:#x} is not the last block reached")]
  TailMismatch { block: usize },

  #[error("block {block:#x} is not linked back from its successor")]
  BrokenBackLink { block: usize },

  #[error("block {block:#x} ends at {end:#x} but its successor starts at {next:#x}")]
  Gap { block: usize, end: usize, next: usize },

  #[error("block {block:#x} and its successor are both free")]
  UncoalescedNeighbours { block: usize },

  #[error("block {block:#x} has unaligned size {size}")]
  UnalignedSize { block: usize, size: usize },

  #[error("block {block:#x} records payload {recorded:#x}")]
  PayloadMismatch { block: usize, recorded: usize },

  #[error("block {block:#x} lies outside the arena [{base:#x}, {end:#x})")]
  OutOfBounds { block: usize, base: usize, end: usize },
}

/// Walks `directory` and checks every invariant the allocator maintains
/// against the arena `[base, end)`.
///
/// # Safety
///
/// Every header reachable from the directory must be readable.
pub unsafe fn verify(
  directory: &Directory,
  base: *mut u8,
  end: *mut u8,
) -> Result<(), Corruption> {
  let (base, end) = (base as usize, end as usize);
  let head = directory.head();

  if head.is_null() {
    if !directory.tail().is_null() {
      return Err(Corruption::TailMismatch { block: directory.tail() as usize });
    }
    return Ok(());
  }

  unsafe {
    if !(*head).prev.is_null() {
      return Err(Corruption::HeadHasPrev { block: head as usize });
    }
    if head as usize != base {
      return Err(Corruption::OutOfBounds { block: head as usize, base, end });
    }

    let mut last = head;
    for block in directory.iter() {
      let address = block as usize;
      let block_end = Block::end(block) as usize;

      if (*block).size % WORD != 0 {
        return Err(Corruption::UnalignedSize { block: address, size: (*block).size });
      }
      if (*block).payload != Block::payload_of(block) {
        return Err(Corruption::PayloadMismatch {
          block: address,
          recorded: (*block).payload as usize,
        });
      }
      if address < base || block_end > end {
        return Err(Corruption::OutOfBounds { block: address, base, end });
      }

      let next = (*block).next;
      if !next.is_null() {
        if (*next).prev != block {
          return Err(Corruption::BrokenBackLink { block: address });
        }
        if next as usize != block_end {
          return Err(Corruption::Gap {
            block: address,
            end: block_end,
            next: next as usize,
          });
        }
        if (*block).is_free && (*next).is_free {
          return Err(Corruption::UncoalescedNeighbours { block: address });
        }
      }

      last = block;
    }

    if last != directory.tail() {
      return Err(Corruption::TailMismatch { block: directory.tail() as usize });
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::ptr;

  use super::*;
  use crate::block::HEADER_SIZE;

  fn arena(sizes: &[(usize, bool)]) -> (Vec<usize>, Directory, Vec<*mut Block>) {
    let total: usize = sizes.iter().map(|(size, _)| size + HEADER_SIZE).sum();
    let mut buffer = vec![0usize; total / WORD];
    let mut directory = Directory::new();
    let mut blocks = Vec::new();
    let mut at = buffer.as_mut_ptr() as *mut u8;

    for &(size, is_free) in sizes {
      unsafe {
        let block = Block::write(at, size, is_free, ptr::null_mut(), ptr::null_mut());
        directory.append(block);
        blocks.push(block);
        at = Block::end(block);
      }
    }

    (buffer, directory, blocks)
  }

  fn bounds(buffer: &mut [usize]) -> (*mut u8, *mut u8) {
    let range = buffer.as_mut_ptr_range();
    (range.start as *mut u8, range.end as *mut u8)
  }

  #[test]
  fn test_verify_accepts_consistent_directory() {
    let (mut buffer, directory, _) = arena(&[(16, false), (32, true), (8, false)]);
    let (base, end) = bounds(&mut buffer);

    assert_eq!(unsafe { verify(&directory, base, end) }, Ok(()));
    assert_eq!(unsafe { verify(&Directory::new(), ptr::null_mut(), ptr::null_mut()) }, Ok(()));
  }

  #[test]
  fn test_verify_detects_free_neighbours() {
    let (mut buffer, directory, blocks) = arena(&[(16, true), (32, true)]);
    let (base, end) = bounds(&mut buffer);

    assert_eq!(
      unsafe { verify(&directory, base, end) },
      Err(Corruption::UncoalescedNeighbours { block: blocks[0] as usize })
    );
  }

  #[test]
  fn test_verify_detects_overwritten_size() {
    let (mut buffer, directory, blocks) = arena(&[(16, false), (32, false)]);
    let (base, end) = bounds(&mut buffer);

    let first = blocks[0];
    unsafe { (*first).size = 24 };

    assert!(matches!(
      unsafe { verify(&directory, base, end) },
      Err(Corruption::Gap { .. })
    ));
  }

  #[test]
  fn test_verify_detects_broken_back_link() {
    let (mut buffer, directory, blocks) = arena(&[(16, false), (32, false)]);
    let (base, end) = bounds(&mut buffer);

    let second = blocks[1];
    unsafe { (*second).prev = ptr::null_mut() };

    assert_eq!(
      unsafe { verify(&directory, base, end) },
      Err(Corruption::BrokenBackLink { block: blocks[0] as usize })
    );
  }

  #[test]
  fn test_verify_detects_short_arena() {
    let (mut buffer, directory, _) = arena(&[(16, false), (32, false)]);
    let (base, end) = bounds(&mut buffer);

    assert!(matches!(
      unsafe { verify(&directory, base, end.wrapping_sub(WORD)) },
      Err(Corruption::OutOfBounds { .. })
    ));
  }
}
