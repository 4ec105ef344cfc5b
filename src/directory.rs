//! The block directory: every block of the arena, free or allocated, linked
//! in address order.

use std::ptr;

use crate::block::{Block, HEADER_SIZE};

pub struct Directory {
  head: *mut Block,
  tail: *mut Block,
  /// Last block that satisfied an allocation. Next-fit resumes after it.
  rover: *mut Block,
}

impl Directory {
  pub const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
      tail: ptr::null_mut(),
      rover: ptr::null_mut(),
    }
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  pub fn tail(&self) -> *mut Block {
    self.tail
  }

  pub fn rover(&self) -> *mut Block {
    self.rover
  }

  pub fn set_rover(
    &mut self,
    block: *mut Block,
  ) {
    self.rover = block;
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Links `block` after the current tail.
  ///
  /// # Safety
  ///
  /// `block` must be a live header placed right after the current tail.
  pub unsafe fn append(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      (*block).prev = self.tail;
      (*block).next = ptr::null_mut();

      if self.tail.is_null() {
        self.head = block;
      } else {
        (*self.tail).next = block;
      }
    }
    self.tail = block;
  }

  /// Links `block` between `at` and its successor.
  ///
  /// # Safety
  ///
  /// Both must be live headers and `block` must start where `at` ends.
  pub unsafe fn insert_after(
    &mut self,
    at: *mut Block,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*at).next;
      (*block).prev = at;
      (*block).next = next;
      (*at).next = block;

      if next.is_null() {
        self.tail = block;
      } else {
        (*next).prev = block;
      }
    }
  }

  /// Absorbs `b` into `a`. `b` must directly follow `a` and both must be
  /// free.
  ///
  /// # Safety
  ///
  /// Both must be live headers of this directory.
  pub unsafe fn remove_and_merge(
    &mut self,
    a: *mut Block,
    b: *mut Block,
  ) {
    unsafe {
      debug_assert_eq!((*a).next, b);
      debug_assert!((*a).is_free && (*b).is_free);

      (*a).size += (*b).size + HEADER_SIZE;
      (*a).next = (*b).next;

      if (*b).next.is_null() {
        self.tail = a;
      } else {
        (*(*b).next).prev = a;
      }

      (*b).payload = ptr::null_mut();
    }

    if self.rover == b {
      self.rover = a;
    }
  }

  /// Drops every block after `last`, or every block when `last` is null.
  /// The dropped headers are never read, so their memory may already be gone.
  ///
  /// # Safety
  ///
  /// `last` must be null or a live header of this directory.
  pub unsafe fn truncate_after(
    &mut self,
    last: *mut Block,
  ) {
    if last.is_null() {
      self.head = ptr::null_mut();
      self.rover = ptr::null_mut();
    } else {
      unsafe { (*last).next = ptr::null_mut() };

      if self.rover > last {
        self.rover = ptr::null_mut();
      }
    }

    self.tail = last;
  }

  /// Walks the blocks in address order.
  pub fn iter(&self) -> Blocks<'_> {
    Blocks {
      current: self.head,
      _directory: self,
    }
  }

  /// Builds a directory over pre-initialized headers, linking them in slice
  /// order. Addresses need not be contiguous.
  #[cfg(test)]
  pub fn link(blocks: &mut [Block]) -> Self {
    let mut directory = Self::new();
    let base = blocks.as_mut_ptr();
    for i in 0..blocks.len() {
      unsafe { directory.append(base.add(i)) };
    }
    directory
  }
}

pub struct Blocks<'a> {
  current: *mut Block,
  _directory: &'a Directory,
}

impl Iterator for Blocks<'_> {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;
    self.current = unsafe { (*block).next };
    Some(block)
  }
}
