//! Random allocate/free traffic against each fit strategy.
//!
//! ```text
//! cargo run --example traffic -- [operations] [seed]
//! ```

use std::time::Instant;

use brkalloc::{Allocator, Config, FixedBreak, Strategy};
use rand::{Rng, SeedableRng, rngs::StdRng};

const MAX_SIZE: usize = 4096;
const ALLOC_PERCENT: u32 = 70;
const CAPACITY: usize = 256 << 20;

struct Report {
  strategy: Strategy,
  elapsed_ns: u128,
  average_heap: usize,
  peak_heap: usize,
}

fn run(
  strategy: Strategy,
  operations: usize,
  seed: u64,
) -> Report {
  let mut rng = StdRng::seed_from_u64(seed);
  let mut allocator = Allocator::with_break(
    FixedBreak::new(CAPACITY),
    Config::new().with_strategy(strategy),
  );
  let mut live: Vec<*mut u8> = Vec::with_capacity(operations);
  let mut heap_total = 0usize;
  let mut peak_heap = 0usize;

  let start = Instant::now();
  for _ in 0..operations {
    if rng.gen_range(0..100) < ALLOC_PERCENT || live.is_empty() {
      let size = rng.gen_range(1..=MAX_SIZE);
      match allocator.allocate(size) {
        Ok(ptr) => live.push(ptr.as_ptr()),
        Err(error) => {
          eprintln!("{strategy}: {error}");
          break;
        }
      }
    } else {
      let victim = live.swap_remove(rng.gen_range(0..live.len()));
      unsafe { allocator.free(victim) };
    }

    heap_total += allocator.heap_size();
    peak_heap = peak_heap.max(allocator.heap_size());
  }

  for ptr in live.drain(..) {
    unsafe { allocator.free(ptr) };
  }
  let elapsed_ns = start.elapsed().as_nanos();

  if let Err(corruption) = allocator.verify() {
    eprintln!("{strategy}: heap corrupted: {corruption}");
  }
  println!("{strategy}: {:?}", allocator.stats());

  Report {
    strategy,
    elapsed_ns,
    average_heap: heap_total / operations.max(1),
    peak_heap,
  }
}

fn main() {
  env_logger::init();

  let mut args = std::env::args().skip(1);
  let operations = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(10_000);
  let seed = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(0x5EED);

  let reports: Vec<Report> = Strategy::ALL
    .into_iter()
    .map(|strategy| run(strategy, operations, seed))
    .collect();

  println!();
  println!("{:<10} {:>14} {:>14} {:>14}", "strategy", "ns/op", "avg heap", "peak heap");
  for report in reports {
    println!(
      "{:<10} {:>14} {:>14} {:>14}",
      report.strategy.name(),
      report.elapsed_ns / operations.max(1) as u128,
      report.average_heap,
      report.peak_heap,
    );
  }
}
