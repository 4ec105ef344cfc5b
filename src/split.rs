//! Splitting oversized free blocks and coalescing adjacent free ones.
//!
//! ```text
//!   split(block, 32):
//!
//!   ┌─────┬──────────────────────────────┐      ┌─────┬──────┬─────┬─────────────┐
//!   │ Hdr │             128              │  ->  │ Hdr │  32  │ Hdr │  128-32-Hdr │
//!   └─────┴──────────────────────────────┘      └─────┴──────┴─────┴─────────────┘
//!
//!   coalesce(B):   [A free][B free][C free]  ->  [A free                      ]
//! ```

use log::trace;

use crate::{
  block::{Block, HEADER_SIZE},
  directory::Directory,
};

/// Carves `block` down to `size` bytes and links the remainder after it as a
/// free block, provided the remainder can hold a header plus `min_fragment`
/// bytes. Returns whether the block was split.
///
/// # Safety
///
/// `block` must be a live header of `directory` and `size` word aligned.
pub unsafe fn split(
  directory: &mut Directory,
  block: *mut Block,
  size: usize,
  min_fragment: usize,
) -> bool {
  unsafe {
    let old_size = (*block).size;
    let Some(needed) = size
      .checked_add(HEADER_SIZE)
      .and_then(|needed| needed.checked_add(min_fragment))
    else {
      return false;
    };

    if old_size < needed {
      return false;
    }

    (*block).size = size;
    let remainder = Block::write(
      Block::end(block),
      old_size - size - HEADER_SIZE,
      true,
      block,
      (*block).next,
    );
    directory.insert_after(block, remainder);

    trace!(
      "split {:p}: {} -> {} + {}",
      block,
      old_size,
      size,
      (*remainder).size
    );
  }

  true
}

/// Merges the free `block` with a free successor and a free predecessor.
/// Returns the surviving block and the number of merges performed.
///
/// # Safety
///
/// `block` must be a free, live header of `directory`.
pub unsafe fn coalesce(
  directory: &mut Directory,
  block: *mut Block,
) -> (*mut Block, usize) {
  let mut block = block;
  let mut merges = 0;

  unsafe {
    let next = (*block).next;
    if !next.is_null() && (*next).is_free {
      directory.remove_and_merge(block, next);
      merges += 1;
    }

    let prev = (*block).prev;
    if !prev.is_null() && (*prev).is_free {
      directory.remove_and_merge(prev, block);
      block = prev;
      merges += 1;
    }
  }

  (block, merges)
}
