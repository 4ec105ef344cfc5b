//! One lock around a whole [`Allocator`], for callers on several threads and
//! for use as the Rust global allocator.
//!
//! ```rust,ignore
//! use brkalloc::{Allocator, Config, Locked, Sbrk};
//!
//! #[global_allocator]
//! static GLOBAL: Locked<Sbrk> = Locked::new(Allocator::new(Config::new()));
//! ```
//!
//! A logger that allocates must not be installed while the allocator is the
//! global one: logging from inside the lock would re-enter it.

use std::{
  alloc::{GlobalAlloc, Layout},
  ptr,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
  align::WORD,
  allocator::{Allocator, ZERO_SIZED},
  arena::ProgramBreak,
};

pub struct Locked<B: ProgramBreak> {
  inner: Mutex<Allocator<B>>,
}

impl<B: ProgramBreak> Locked<B> {
  pub const fn new(allocator: Allocator<B>) -> Self {
    Self {
      inner: Mutex::new(allocator),
    }
  }

  /// Exclusive access to the allocator. A poisoned lock is taken over: every
  /// operation leaves the directory consistent before it can panic.
  pub fn lock(&self) -> MutexGuard<'_, Allocator<B>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

unsafe impl<B: ProgramBreak + Send> GlobalAlloc for Locked<B> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > WORD {
      return ptr::null_mut();
    }

    match self.lock().allocate(layout.size()) {
      Ok(payload) => payload.as_ptr(),
      Err(_) => ptr::null_mut(),
    }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > WORD {
      return ptr::null_mut();
    }

    match self.lock().zero_allocate(1, layout.size()) {
      Ok(payload) => payload.as_ptr(),
      Err(_) => ptr::null_mut(),
    }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { self.lock().free(ptr) }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > WORD {
      return ptr::null_mut();
    }

    match unsafe { self.lock().resize(ptr, new_size) } {
      Ok(payload) if payload != ZERO_SIZED => payload.as_ptr(),
      Ok(_) | Err(_) => ptr::null_mut(),
    }
  }
}
