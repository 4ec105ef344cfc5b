//! C entry points over one process-wide allocator on the process break.
//!
//! Zero-byte requests and every failure return `NULL`.

use std::ptr::{self, NonNull};

use libc::{c_int, c_void, size_t};
use log::warn;

use crate::{
  allocator::{Allocator, Config, ZERO_SIZED},
  arena::Sbrk,
  diagnostics::Stats,
  error::AllocError,
  fit::Strategy,
  locked::Locked,
};

static HEAP: Locked<Sbrk> = Locked::new(Allocator::new(Config::new()));

fn to_c(result: Result<NonNull<u8>, AllocError>) -> *mut c_void {
  match result {
    Ok(payload) if payload != ZERO_SIZED => payload.as_ptr() as *mut c_void,
    _ => ptr::null_mut(),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn brk_malloc(size: size_t) -> *mut c_void {
  to_c(HEAP.lock().allocate(size))
}

/// # Safety
///
/// `ptr` must be `NULL` or come from this interface, and must not be used
/// afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brk_free(ptr: *mut c_void) {
  unsafe { HEAP.lock().free(ptr as *mut u8) }
}

/// # Safety
///
/// As for [`brk_free`]. On success `ptr` must not be used afterwards unless
/// it is the returned pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brk_realloc(
  ptr: *mut c_void,
  size: size_t,
) -> *mut c_void {
  to_c(unsafe { HEAP.lock().resize(ptr as *mut u8, size) })
}

#[unsafe(no_mangle)]
pub extern "C" fn brk_calloc(
  count: size_t,
  size: size_t,
) -> *mut c_void {
  to_c(HEAP.lock().zero_allocate(count, size))
}

/// Selects the fit strategy: 0 first-fit, 1 next-fit, 2 best-fit. Returns 0,
/// or -1 for an unknown strategy.
#[unsafe(no_mangle)]
pub extern "C" fn brk_configure(strategy: c_int) -> c_int {
  match Strategy::try_from(strategy) {
    Ok(strategy) => {
      HEAP.lock().configure(strategy);
      0
    }
    Err(error) => {
      warn!("brk_configure: {error}");
      -1
    }
  }
}

/// Copies the counters into `out`. Returns 0, or -1 when `out` is `NULL`.
///
/// # Safety
///
/// `out` must be `NULL` or valid for a write of [`Stats`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brk_stats(out: *mut Stats) -> c_int {
  if out.is_null() {
    return -1;
  }

  unsafe { out.write(HEAP.lock().stats()) };
  0
}

/// Bytes currently taken from the process break.
#[unsafe(no_mangle)]
pub extern "C" fn brk_heap_size() -> size_t {
  HEAP.lock().heap_size()
}
