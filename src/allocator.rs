use std::{
  fmt,
  ptr::{self, NonNull},
};

use log::{debug, trace, warn};

use crate::{
  align::{WORD, align_up},
  arena::{Arena, ProgramBreak, Sbrk},
  block::{Block, HEADER_SIZE},
  diagnostics::{self, Corruption, Stats},
  directory::Directory,
  error::AllocError,
  fit::{FitStrategy, Strategy},
  split,
};

/// Returned for zero-byte requests. Never inside an arena, accepted by
/// `free` (as a no-op) and by `resize` (as a fresh allocation).
pub const ZERO_SIZED: NonNull<u8> = NonNull::<usize>::dangling().cast();

/// Tuning knobs of an [`Allocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
  pub strategy: Strategy,
  /// Minimum number of pages requested from the break at once.
  pub lot_pages: usize,
  /// Size, in pages, a trailing free run must reach before it is released.
  pub shrink_pages: usize,
  /// Smallest payload worth carving off as a separate free block.
  pub min_fragment: usize,
}

impl Config {
  pub const DEFAULT_LOT_PAGES: usize = 4;
  pub const DEFAULT_SHRINK_PAGES: usize = 8;

  pub const fn new() -> Self {
    Self {
      strategy: Strategy::FirstFit,
      lot_pages: Self::DEFAULT_LOT_PAGES,
      shrink_pages: Self::DEFAULT_SHRINK_PAGES,
      min_fragment: WORD,
    }
  }

  pub const fn with_strategy(
    mut self,
    strategy: Strategy,
  ) -> Self {
    self.strategy = strategy;
    self
  }

  pub const fn with_lot_pages(
    mut self,
    lot_pages: usize,
  ) -> Self {
    self.lot_pages = lot_pages;
    self
  }

  pub const fn with_shrink_pages(
    mut self,
    shrink_pages: usize,
  ) -> Self {
    self.shrink_pages = shrink_pages;
    self
  }

  pub const fn with_min_fragment(
    mut self,
    min_fragment: usize,
  ) -> Self {
    self.min_fragment = min_fragment;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}

/// A block as seen from outside the allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload address.
  pub address: usize,
  pub size: usize,
  pub is_free: bool,
}

/// A general-purpose allocator serving every request from one arena grown
/// and shrunk through a [`ProgramBreak`].
///
/// The allocator is single-threaded: every mutating operation takes
/// `&mut self`. Wrap it in [`Locked`](crate::Locked) to share it.
pub struct Allocator<B: ProgramBreak = Sbrk> {
  arena: Arena<B>,
  directory: Directory,
  config: Config,
  stats: Stats,
}

// Headers live in memory owned by the arena, which moves with the allocator.
unsafe impl<B: ProgramBreak + Send> Send for Allocator<B> {}

impl Allocator<Sbrk> {
  /// An allocator on the process break.
  pub const fn new(config: Config) -> Self {
    Self::with_break(Sbrk, config)
  }
}

impl<B: ProgramBreak> Allocator<B> {
  pub const fn with_break(
    source: B,
    config: Config,
  ) -> Self {
    Self {
      arena: Arena::new(source),
      directory: Directory::new(),
      config,
      stats: Stats::new(),
    }
  }

  /// Selects the search policy for subsequent allocations.
  pub fn configure(
    &mut self,
    strategy: Strategy,
  ) {
    debug!("fit strategy: {} -> {}", self.config.strategy, strategy);
    self.config.strategy = strategy;
    self.directory.set_rover(ptr::null_mut());
  }

  pub fn strategy(&self) -> Strategy {
    self.config.strategy
  }

  pub fn config(&self) -> Config {
    self.config
  }

  pub fn stats(&self) -> Stats {
    self.stats
  }

  pub fn source(&self) -> &B {
    self.arena.source()
  }

  /// Bytes currently taken from the break, headers included.
  pub fn heap_size(&self) -> usize {
    self.arena.len()
  }

  /// Every block in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.directory.iter().map(|block| unsafe {
      BlockInfo {
        address: Block::payload_of(block) as usize,
        size: (*block).size,
        is_free: (*block).is_free,
      }
    })
  }

  /// Checks every directory invariant.
  pub fn verify(&self) -> Result<(), Corruption> {
    unsafe { diagnostics::verify(&self.directory, self.arena.base(), self.arena.end()) }
  }

  #[cfg(debug_assertions)]
  fn check(&self) {
    if let Err(corruption) = self.verify() {
      panic!("heap corruption: {corruption}");
    }
  }

  #[cfg(not(debug_assertions))]
  fn check(&self) {}

  /// Whether `ptr` is the payload address of a block of this allocator.
  pub fn is_valid_pointer(
    &self,
    ptr: *const u8,
  ) -> bool {
    if !self.arena.contains(ptr) || ptr as usize % WORD != 0 {
      return false;
    }

    if ptr as usize - (self.arena.base() as usize) < HEADER_SIZE {
      return false;
    }

    let block = Block::from_payload(ptr as *mut u8);
    unsafe { (*block).payload as *const u8 == ptr }
  }

  /// Allocates `size` bytes, word aligned. A zero-byte request returns
  /// [`ZERO_SIZED`].
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      trace!("allocate(0) -> zero-sized");
      return Ok(ZERO_SIZED);
    }

    let aligned = align_up(size).ok_or(AllocError::SizeOverflow)?;
    let block = unsafe { self.place(aligned)? };
    let payload = Block::payload_of(block);

    trace!("allocate({}) -> {:p}", size, payload);
    self.check();

    NonNull::new(payload).ok_or(AllocError::OutOfMemory { requested: size })
  }

  unsafe fn place(
    &mut self,
    size: usize,
  ) -> Result<*mut Block, AllocError> {
    let mut block = self.config.strategy.find(&self.directory, size);

    unsafe {
      if block.is_null() {
        let grown = self
          .arena
          .grow_block(&mut self.directory, size, self.config.lot_pages)?;
        self.stats.grows += 1;

        let (merged, merges) = split::coalesce(&mut self.directory, grown);
        self.stats.merges += merges;
        block = merged;
      }

      if split::split(&mut self.directory, block, size, self.config.min_fragment) {
        self.stats.splits += 1;
      }

      (*block).is_free = false;
    }

    self.directory.set_rover(block);
    self.stats.allocations += 1;
    Ok(block)
  }

  /// Releases the allocation at `ptr`. Null, [`ZERO_SIZED`], pointers this
  /// allocator did not hand out and blocks already free are ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must not be used after this call. Rejection of foreign pointers is
  /// a best-effort check: a stale pointer whose address was handed out again
  /// releases the new allocation.
  pub unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() || ptr == ZERO_SIZED.as_ptr() {
      return;
    }

    if !self.is_valid_pointer(ptr) {
      trace!("free({:p}) ignored, not an allocation", ptr);
      return;
    }

    let block = Block::from_payload(ptr);

    unsafe {
      if (*block).is_free {
        trace!("free({:p}) ignored, already free", ptr);
        return;
      }

      (*block).is_free = true;
      self.stats.frees += 1;

      let (_, merges) = split::coalesce(&mut self.directory, block);
      self.stats.merges += merges;

      let threshold = self
        .arena
        .source()
        .page_size()
        .saturating_mul(self.config.shrink_pages);
      if let Some(released) = self.arena.maybe_shrink(&mut self.directory, threshold) {
        self.stats.shrinks += 1;
        debug!("released {} trailing bytes", released);
      }
    }

    trace!("free({:p})", ptr);
    self.check();
  }

  /// Resizes the allocation at `ptr` to hold `new_size` bytes, moving it when
  /// the block is too small. The old block survives a failed move.
  ///
  /// # Safety
  ///
  /// As for [`free`](Self::free): once a different pointer is returned, `ptr`
  /// must not be used.
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let Some(current) = NonNull::new(ptr).filter(|&current| current != ZERO_SIZED) else {
      return self.allocate(new_size);
    };

    let block = Block::from_payload(ptr);
    if !self.is_valid_pointer(ptr) || unsafe { (*block).is_free } {
      warn!("resize({:p}, {}) rejected, not a live allocation", ptr, new_size);
      return Err(AllocError::InvalidPointer {
        address: ptr as usize,
      });
    }

    let old_size = unsafe { (*block).size };
    let wanted = align_up(new_size).ok_or(AllocError::SizeOverflow)?;
    if old_size >= wanted {
      trace!("resize({:p}, {}) fits in place", ptr, new_size);
      return Ok(current);
    }

    let moved = self.allocate(new_size)?;
    unsafe {
      ptr::copy_nonoverlapping(ptr, moved.as_ptr(), old_size);
      self.free(ptr);
    }

    trace!("resize({:p}, {}) -> {:p}", ptr, new_size, moved);
    Ok(moved)
  }

  /// Allocates `count * element_size` zeroed bytes.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let size = count
      .checked_mul(element_size)
      .ok_or(AllocError::SizeOverflow)?;
    let payload = self.allocate(size)?;

    if size != 0 {
      unsafe { payload.as_ptr().write_bytes(0, size) };
    }

    Ok(payload)
  }
}

impl<B: ProgramBreak> fmt::Display for Allocator<B> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(
      f,
      "arena {:p}..{:p} ({} bytes, {})",
      self.arena.base(),
      self.arena.end(),
      self.heap_size(),
      self.config.strategy
    )?;

    for block in self.blocks() {
      writeln!(
        f,
        "  {:#014x} {:>8} {}",
        block.address,
        block.size,
        if block.is_free { "free" } else { "used" }
      )?;
    }

    Ok(())
  }
}
