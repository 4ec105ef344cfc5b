//! The arena and the program break it is carved from.
//!
//! ```text
//!   base                                              end == break
//!   ▼                                                 ▼
//!   ┌────────┬──────────┬────────┬──────────────────────┐
//!   │ Hdr A  │ Hdr B(F) │ Hdr C  │ Hdr D(F)             │
//!   └────────┴──────────┴────────┴──────────────────────┘
//!                                ◄─── trailing run ────►
//!                                 released once it reaches
//!                                 the shrink threshold
//! ```

use std::{
  alloc::{self, Layout},
  ptr,
  sync::LazyLock,
};

use libc::{c_void, intptr_t, sbrk};
use log::{debug, warn};

use crate::{
  align::{WORD, round_up},
  block::{Block, HEADER_SIZE},
  directory::Directory,
  error::AllocError,
};

/// Fill written over memory a [`FixedBreak`] takes back, so tests can tell
/// whether anything touched it afterwards.
pub(crate) const RETRACTED: u8 = 0xDB;

static PAGE_SIZE: LazyLock<usize> = LazyLock::new(page_size::get);

/// The system page size.
pub fn page_size() -> usize {
  *PAGE_SIZE
}

/// A contiguous, growable source of memory shaped like the process break.
///
/// # Safety
///
/// Bytes between the previous break returned by [`extend`] and the new break
/// must be valid for reads and writes and used by nothing but the caller
/// until they are given back through [`retract`].
///
/// [`extend`]: ProgramBreak::extend
/// [`retract`]: ProgramBreak::retract
pub unsafe trait ProgramBreak {
  /// The current break.
  fn current(&mut self) -> *mut u8;

  /// Moves the break up by `increment` bytes and returns the previous break.
  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<*mut u8>;

  /// Moves the break down by `decrement` bytes.
  fn retract(
    &mut self,
    decrement: usize,
  ) -> bool;

  /// Granularity the arena grows and shrinks by.
  fn page_size(&self) -> usize {
    page_size()
  }
}

/// The process break, moved with `sbrk(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sbrk;

unsafe impl ProgramBreak for Sbrk {
  fn current(&mut self) -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<*mut u8> {
    let increment = intptr_t::try_from(increment).ok()?;
    let previous = unsafe { sbrk(increment) };

    if previous == usize::MAX as *mut c_void {
      return None;
    }

    Some(previous as *mut u8)
  }

  fn retract(
    &mut self,
    decrement: usize,
  ) -> bool {
    let Ok(decrement) = intptr_t::try_from(decrement) else {
      return false;
    };

    unsafe { sbrk(-decrement) != usize::MAX as *mut c_void }
  }
}

/// The current program break of the process.
pub fn program_break() -> *mut u8 {
  Sbrk.current()
}

/// A break simulated over a fixed, zero-initialized buffer. Extending past the
/// capacity fails the way `sbrk` does when the system runs out of memory.
pub struct FixedBreak {
  base: *mut u8,
  capacity: usize,
  top: usize,
  page_size: usize,
}

// The buffer is owned exclusively by this value.
unsafe impl Send for FixedBreak {}

impl FixedBreak {
  /// A buffer of `capacity` bytes growing in system pages.
  pub fn new(capacity: usize) -> Self {
    Self::with_page_size(capacity, page_size())
  }

  /// A buffer of `capacity` bytes growing in `page_size` steps.
  ///
  /// # Panics
  ///
  /// If `page_size` is not a non-zero multiple of the machine word.
  pub fn with_page_size(
    capacity: usize,
    page_size: usize,
  ) -> Self {
    assert!(
      page_size != 0 && page_size % WORD == 0,
      "page size {page_size} is not a multiple of {WORD}"
    );

    let layout = Self::layout(capacity);
    let base = unsafe { alloc::alloc_zeroed(layout) };
    if base.is_null() {
      alloc::handle_alloc_error(layout);
    }

    Self {
      base,
      capacity,
      top: 0,
      page_size,
    }
  }

  fn layout(capacity: usize) -> Layout {
    match Layout::from_size_align(capacity.max(WORD), WORD) {
      Ok(layout) => layout,
      Err(_) => panic!("capacity {capacity} is too large"),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes currently below the break.
  pub fn used(&self) -> usize {
    self.top
  }
}

impl Drop for FixedBreak {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base, Self::layout(self.capacity)) };
  }
}

unsafe impl ProgramBreak for FixedBreak {
  fn current(&mut self) -> *mut u8 {
    self.base.wrapping_add(self.top)
  }

  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<*mut u8> {
    if increment > self.capacity - self.top {
      return None;
    }

    let previous = self.current();
    self.top += increment;
    Some(previous)
  }

  fn retract(
    &mut self,
    decrement: usize,
  ) -> bool {
    if decrement > self.top {
      return false;
    }

    self.top -= decrement;
    if cfg!(test) {
      unsafe { self.base.add(self.top).write_bytes(RETRACTED, decrement) };
    }
    true
  }

  fn page_size(&self) -> usize {
    self.page_size
  }
}

/// The single contiguous range the allocator manages, `[base, end)`. Both are
/// null while the arena does not exist.
pub struct Arena<B> {
  source: B,
  base: *mut u8,
  end: *mut u8,
}

impl<B: ProgramBreak> Arena<B> {
  pub const fn new(source: B) -> Self {
    Self {
      source,
      base: ptr::null_mut(),
      end: ptr::null_mut(),
    }
  }

  pub fn source(&self) -> &B {
    &self.source
  }

  pub fn base(&self) -> *mut u8 {
    self.base
  }

  pub fn end(&self) -> *mut u8 {
    self.end
  }

  pub fn len(&self) -> usize {
    self.end as usize - self.base as usize
  }

  pub fn is_empty(&self) -> bool {
    self.base.is_null()
  }

  /// Whether `ptr` lies strictly inside the arena.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    !self.is_empty() && ptr > self.base as *const u8 && ptr < self.end as *const u8
  }

  /// Bytes to request for a grow of at least `min`: whole pages, never less
  /// than one lot.
  fn chunk_size(
    &self,
    min: usize,
    lot_pages: usize,
  ) -> Option<usize> {
    let page = self.source.page_size();
    let lot = page.checked_mul(lot_pages)?;
    Some(round_up(min, page)?.max(lot))
  }

  /// Grows the arena by `len` bytes and returns the start of the new range.
  fn grow(
    &mut self,
    len: usize,
  ) -> Result<*mut u8, AllocError> {
    let out_of_memory = || AllocError::OutOfMemory { requested: len };

    if self.is_empty() {
      let current = self.source.current();
      let padding = (current as usize).wrapping_neg() & (WORD - 1);
      let total = len.checked_add(padding).ok_or(AllocError::SizeOverflow)?;
      let previous = self.source.extend(total).ok_or_else(out_of_memory)?;

      if previous != current {
        warn!(
          "program break moved by a foreign caller (expected {:p}, got {:p}), not creating the arena",
          current, previous
        );
        self.undo_extend(total);
        return Err(out_of_memory());
      }

      self.base = previous.wrapping_add(padding);
      self.end = self.base.wrapping_add(len);
      debug!("arena created at {:p} with {} bytes", self.base, len);
      return Ok(self.base);
    }

    let previous = self.source.extend(len).ok_or_else(out_of_memory)?;
    if previous != self.end {
      warn!(
        "program break moved by a foreign caller (break {:p}, arena end {:p}), not growing",
        previous, self.end
      );
      self.undo_extend(len);
      return Err(out_of_memory());
    }

    self.end = self.end.wrapping_add(len);
    debug!("arena grown by {} bytes to {}", len, self.len());
    Ok(previous)
  }

  /// Takes back an extension the arena could not use.
  fn undo_extend(
    &mut self,
    len: usize,
  ) {
    if !self.source.retract(len) {
      warn!("could not return {} unusable bytes to the program break, leaking them", len);
    }
  }

  /// Gives `[new_end, end)` back to the break source.
  fn release(
    &mut self,
    new_end: *mut u8,
  ) -> bool {
    let len = self.end as usize - new_end as usize;

    if self.source.current() != self.end {
      debug!("program break is past the arena end, keeping {} trailing bytes", len);
      return false;
    }

    if !self.source.retract(len) {
      warn!("could not return {} bytes to the program break", len);
      return false;
    }

    if new_end == self.base {
      debug!("arena at {:p} fully released", self.base);
      self.base = ptr::null_mut();
      self.end = ptr::null_mut();
    } else {
      self.end = new_end;
      debug!("arena shrunk by {} bytes to {}", len, self.len());
    }

    true
  }

  /// Grows the arena so that a request of `size` payload bytes can be served
  /// and appends the new range to `directory` as one free block. When the
  /// tail is already free the grow only covers what the tail lacks; the
  /// caller coalesces the two.
  ///
  /// # Safety
  ///
  /// `directory` must describe exactly this arena.
  pub unsafe fn grow_block(
    &mut self,
    directory: &mut Directory,
    size: usize,
    lot_pages: usize,
  ) -> Result<*mut Block, AllocError> {
    let tail = directory.tail();
    let min = if !tail.is_null() && unsafe { (*tail).is_free } {
      size.saturating_sub(unsafe { (*tail).size })
    } else {
      size.checked_add(HEADER_SIZE).ok_or(AllocError::SizeOverflow)?
    };
    let len = self
      .chunk_size(min.max(HEADER_SIZE + WORD), lot_pages)
      .ok_or(AllocError::SizeOverflow)?;

    let start = self.grow(len)?;

    unsafe {
      let block = Block::write(start, len - HEADER_SIZE, true, ptr::null_mut(), ptr::null_mut());
      directory.append(block);
      Ok(block)
    }
  }

  /// Releases the run of free blocks ending at the tail once it spans at
  /// least `threshold` bytes, headers included. Returns the released size.
  ///
  /// # Safety
  ///
  /// `directory` must describe exactly this arena.
  pub unsafe fn maybe_shrink(
    &mut self,
    directory: &mut Directory,
    threshold: usize,
  ) -> Option<usize> {
    let mut first = ptr::null_mut();
    let mut run = 0usize;
    let mut current = directory.tail();

    unsafe {
      while !current.is_null() && (*current).is_free {
        run += (*current).size + HEADER_SIZE;
        first = current;
        current = (*current).prev;
      }
    }

    if first.is_null() || run < threshold {
      return None;
    }

    // `first` lies in the released range: read its link before the break moves.
    let last = unsafe { (*first).prev };
    if !self.release(first as *mut u8) {
      return None;
    }

    unsafe { directory.truncate_after(last) };
    Some(run)
  }
}
