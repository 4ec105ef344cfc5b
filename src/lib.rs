//! # brkalloc - A Fit-Strategy Memory Allocator
//!
//! This crate provides a general-purpose allocator (`allocate`, `free`,
//! `resize`, `zero_allocate`) that manages a single arena carved from the
//! process break with `sbrk(2)`.
//!
//! ## Overview
//!
//! Every region of the arena, free or allocated, is described by a header
//! and linked to its neighbours in address order:
//!
//! ```text
//!   Block Directory:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA                                   │
//!   │                                                                      │
//!   │  ┌─────┬──────┬─────┬──────────┬─────┬──────┬─────┬──────────────┐   │
//!   │  │ Hdr │ used │ Hdr │   free   │ Hdr │ used │ Hdr │     free     │   │
//!   │  └─────┴──────┴─────┴──────────┴─────┴──────┴─────┴──────────────┘   │
//!   │   ▲  │          ▲  │             ▲  │         ▲                 ▲    │
//!   │  head└─next────►┘  └───next─────►┘  └──next──►┘ tail       Program   │
//!   │                                                             Break    │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request is served by the first free block a [`Strategy`] picks
//! (first-fit, next-fit or best-fit). An oversized block is split, and a
//! request nothing fits grows the arena by at least one lot of pages.
//! Freed blocks are merged with free neighbours, and a trailing free run that
//! reaches the shrink threshold is handed back to the operating system.
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── align       - Alignment macro and checked rounding
//!   ├── block       - Block header (internal)
//!   ├── directory   - Address-ordered block list (internal)
//!   ├── fit         - First/next/best-fit strategies
//!   ├── split       - Splitting and coalescing (internal)
//!   ├── arena       - Program break sources, grow and shrink
//!   ├── diagnostics - Counters and invariant checks
//!   ├── allocator   - The Allocator façade
//!   ├── locked      - Mutex wrapper, GlobalAlloc
//!   └── ffi         - C entry points
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{Allocator, Config, FixedBreak, Strategy};
//!
//! let mut allocator = Allocator::with_break(
//!     FixedBreak::new(1 << 20),
//!     Config::new().with_strategy(Strategy::BestFit),
//! );
//!
//! let ptr = allocator.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0x2A, 64);
//!     allocator.free(ptr.as_ptr());
//! }
//! assert_eq!(allocator.stats().frees, 1);
//! ```
//!
//! `Allocator::new(config)` works the same way on the real process break.
//!
//! ## Safety
//!
//! The allocator is single-threaded. Share it through [`Locked`], which is
//! also a [`GlobalAlloc`](std::alloc::GlobalAlloc).

pub mod align;
mod allocator;
mod arena;
mod block;
mod diagnostics;
mod directory;
mod error;
pub mod ffi;
mod fit;
mod locked;
mod split;

pub use allocator::{Allocator, BlockInfo, Config, ZERO_SIZED};
pub use arena::{FixedBreak, ProgramBreak, Sbrk, page_size, program_break};
pub use block::HEADER_SIZE;
pub use diagnostics::{Corruption, Stats};
pub use error::AllocError;
pub use fit::Strategy;
pub use locked::Locked;
