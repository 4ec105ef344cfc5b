//! Free-block search strategies.
//!
//! ```text
//!   request: 48 bytes
//!
//!   ┌───────┬───┬──────┬───┬───────┬───┬──────────────┐
//!   │ 200 F │ A │ 50 F │ A │ 120 F │ A │   free tail  │
//!   └───────┴───┴──────┴───┴───────┴───┴──────────────┘
//!       ▲            ▲
//!       │            └── best-fit: smallest block that holds the request
//!       └── first-fit: first block that holds the request
//!
//!   next-fit: first block that holds the request, starting after the block
//!             that satisfied the previous allocation and wrapping around.
//! ```

use std::{fmt, ptr, str::FromStr};

use crate::{block::Block, directory::Directory, error::AllocError};

/// Locates a free block of at least `size` payload bytes.
pub trait FitStrategy {
  /// Returns a free block with `size >= request`, or null.
  fn find(
    &self,
    directory: &Directory,
    size: usize,
  ) -> *mut Block;
}

unsafe fn fits(
  block: *mut Block,
  size: usize,
) -> bool {
  unsafe { (*block).is_free && (*block).size >= size }
}

pub struct FirstFit;

impl FitStrategy for FirstFit {
  fn find(
    &self,
    directory: &Directory,
    size: usize,
  ) -> *mut Block {
    directory
      .iter()
      .find(|&block| unsafe { fits(block, size) })
      .unwrap_or(ptr::null_mut())
  }
}

pub struct NextFit;

impl FitStrategy for NextFit {
  fn find(
    &self,
    directory: &Directory,
    size: usize,
  ) -> *mut Block {
    if directory.is_empty() {
      return ptr::null_mut();
    }

    let rover = directory.rover();
    let start = if rover.is_null() || unsafe { (*rover).next.is_null() } {
      directory.head()
    } else {
      unsafe { (*rover).next }
    };

    let mut current = start;
    loop {
      unsafe {
        if fits(current, size) {
          return current;
        }

        current = (*current).next;
      }

      if current.is_null() {
        current = directory.head();
      }

      if current == start {
        return ptr::null_mut();
      }
    }
  }
}

pub struct BestFit;

impl FitStrategy for BestFit {
  fn find(
    &self,
    directory: &Directory,
    size: usize,
  ) -> *mut Block {
    let mut best: *mut Block = ptr::null_mut();

    for block in directory.iter() {
      unsafe {
        if !fits(block, size) {
          continue;
        }

        if (*block).size == size {
          return block;
        }

        if best.is_null() || (*block).size < (*best).size {
          best = block;
        }
      }
    }

    best
  }
}

/// The search policy an allocator uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
  #[default]
  FirstFit,
  NextFit,
  BestFit,
}

impl Strategy {
  pub const ALL: [Strategy; 3] = [Strategy::FirstFit, Strategy::NextFit, Strategy::BestFit];

  pub fn name(self) -> &'static str {
    match self {
      Strategy::FirstFit => "first-fit",
      Strategy::NextFit => "next-fit",
      Strategy::BestFit => "best-fit",
    }
  }
}

impl FitStrategy for Strategy {
  fn find(
    &self,
    directory: &Directory,
    size: usize,
  ) -> *mut Block {
    match self {
      Strategy::FirstFit => FirstFit.find(directory, size),
      Strategy::NextFit => NextFit.find(directory, size),
      Strategy::BestFit => BestFit.find(directory, size),
    }
  }
}

/// Numbering used across the C interface.
impl TryFrom<i32> for Strategy {
  type Error = AllocError;

  fn try_from(index: i32) -> Result<Self, Self::Error> {
    match index {
      0 => Ok(Strategy::FirstFit),
      1 => Ok(Strategy::NextFit),
      2 => Ok(Strategy::BestFit),
      _ => Err(AllocError::Unsupported(format!("unknown fit strategy {index}"))),
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Strategy {
  type Err = AllocError;

  fn from_str(name: &str) -> Result<Self, Self::Err> {
    match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
      "first-fit" | "firstfit" | "first" => Ok(Strategy::FirstFit),
      "next-fit" | "nextfit" | "next" => Ok(Strategy::NextFit),
      "best-fit" | "bestfit" | "best" => Ok(Strategy::BestFit),
      _ => Err(AllocError::Unsupported(format!("unknown fit strategy `{name}`"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Free blocks of 200, 50 and 120 bytes separated by allocated ones, and a
  /// large free tail.
  fn fixture() -> Vec<Block> {
    [(200, true), (16, false), (50, true), (16, false), (120, true), (16, false), (4096, true)]
      .iter()
      .map(|&(size, is_free)| Block::new(size, is_free, ptr::null_mut(), ptr::null_mut()))
      .collect()
  }

  fn index_of(
    storage: &mut [Block],
    block: *mut Block,
  ) -> Option<usize> {
    let base = storage.as_mut_ptr();
    (0..storage.len()).find(|&i| unsafe { base.add(i) } == block)
  }

  #[test]
  fn test_first_fit_takes_the_first_candidate() {
    let mut storage = fixture();
    let directory = Directory::link(&mut storage);

    assert_eq!(index_of(&mut storage, FirstFit.find(&directory, 48)), Some(0));
    assert_eq!(index_of(&mut storage, FirstFit.find(&directory, 201)), Some(6));
    assert!(FirstFit.find(&directory, 5000).is_null());
  }

  #[test]
  fn test_best_fit_takes_the_smallest_candidate() {
    let mut storage = fixture();
    let directory = Directory::link(&mut storage);

    assert_eq!(index_of(&mut storage, BestFit.find(&directory, 48)), Some(2));
    assert_eq!(index_of(&mut storage, BestFit.find(&directory, 51)), Some(4));
    assert_eq!(index_of(&mut storage, BestFit.find(&directory, 120)), Some(4));
    assert!(BestFit.find(&directory, 5000).is_null());
  }

  #[test]
  fn test_best_fit_breaks_ties_by_order() {
    let mut storage: Vec<Block> = [(64, true), (8, false), (64, true)]
      .iter()
      .map(|&(size, is_free)| Block::new(size, is_free, ptr::null_mut(), ptr::null_mut()))
      .collect();
    let directory = Directory::link(&mut storage);

    assert_eq!(index_of(&mut storage, BestFit.find(&directory, 32)), Some(0));
  }

  #[test]
  fn test_next_fit_resumes_after_the_rover() {
    let mut storage = fixture();
    let mut directory = Directory::link(&mut storage);
    let base = storage.as_mut_ptr();

    assert_eq!(index_of(&mut storage, NextFit.find(&directory, 48)), Some(0));

    directory.set_rover(base);
    assert_eq!(index_of(&mut storage, NextFit.find(&directory, 48)), Some(2));

    directory.set_rover(unsafe { base.add(2) });
    assert_eq!(index_of(&mut storage, NextFit.find(&directory, 48)), Some(4));
  }

  #[test]
  fn test_next_fit_wraps_around() {
    let mut storage = fixture();
    let mut directory = Directory::link(&mut storage);
    let base = storage.as_mut_ptr();

    directory.set_rover(unsafe { base.add(4) });
    assert_eq!(index_of(&mut storage, NextFit.find(&directory, 150)), Some(6));

    directory.set_rover(unsafe { base.add(6) });
    assert_eq!(index_of(&mut storage, NextFit.find(&directory, 100)), Some(0));

    directory.set_rover(unsafe { base.add(5) });
    assert_eq!(index_of(&mut storage, NextFit.find(&directory, 48)), Some(6));
    assert!(NextFit.find(&directory, 5000).is_null());
  }

  #[test]
  fn test_empty_directory() {
    let directory = Directory::new();

    for strategy in Strategy::ALL {
      assert!(strategy.find(&directory, 8).is_null());
    }
  }

  #[test]
  fn test_strategy_from_str() {
    assert_eq!("first-fit".parse::<Strategy>().unwrap(), Strategy::FirstFit);
    assert_eq!("Next_Fit".parse::<Strategy>().unwrap(), Strategy::NextFit);
    assert_eq!("best".parse::<Strategy>().unwrap(), Strategy::BestFit);

    for strategy in Strategy::ALL {
      assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
    }

    assert!(matches!("worst-fit".parse::<Strategy>(), Err(AllocError::Unsupported(_))));
  }

  #[test]
  fn test_strategy_from_index() {
    assert_eq!(Strategy::try_from(0), Ok(Strategy::FirstFit));
    assert_eq!(Strategy::try_from(2), Ok(Strategy::BestFit));
    assert!(Strategy::try_from(3).is_err());
    assert!(Strategy::try_from(-1).is_err());
  }
}
