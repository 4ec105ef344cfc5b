use std::{ptr, sync::atomic::{AtomicBool, Ordering}};

use brkalloc::{Allocator, Config, HEADER_SIZE, program_break};

static STEP: AtomicBool = AtomicBool::new(false);

/// Waits until the user presses ENTER when run with `--step`.
/// Useful when you want to inspect memory state with tools like `pmap`, `gdb`,
/// or just visually track how allocations move the program break.
fn block_until_enter_pressed() {
  if !STEP.load(Ordering::Relaxed) {
    return;
  }

  println!("\n>>> Press ENTER to continue...");
  let mut line = String::new();
  let _ = std::io::stdin().read_line(&mut line);
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break = {:?}",
    label,
    std::process::id(),
    program_break(),
  );
}

fn print_alloc(
  label: &str,
  size: usize,
  ptr: *mut u8,
) {
  println!(
    "{label}: requested {size} bytes -> payload {ptr:?}, header {:?}",
    ptr.wrapping_sub(HEADER_SIZE),
  );
}

fn main() {
  env_logger::init();
  STEP.store(std::env::args().any(|arg| arg == "--step"), Ordering::Relaxed);

  let mut allocator = Allocator::new(Config::new().with_lot_pages(1).with_shrink_pages(1));

  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) First allocation creates the arena.
  // --------------------------------------------------------------------
  let first = allocator.allocate(4).expect("allocate u32").as_ptr();
  println!("\n[1] Allocate 4 bytes");
  print_alloc("[1]", 4, first);
  unsafe {
    (first as *mut u32).write(0xDEADBEEF);
    println!("[1] Value written = 0x{:X}", (first as *mut u32).read());
  }
  print_program_break("after first alloc");
  print!("{allocator}");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Odd-sized requests are rounded up to a whole word.
  // --------------------------------------------------------------------
  let second = allocator.allocate(12).expect("allocate 12 bytes").as_ptr();
  println!("\n[2] Allocate 12 bytes");
  print_alloc("[2]", 12, second);
  unsafe { ptr::write_bytes(second, 0xAB, 12) };
  print!("{allocator}");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Free the first block, then ask for less: the hole is reused.
  // --------------------------------------------------------------------
  unsafe { allocator.free(first) };
  println!("\n[3] Freed {first:?}");
  let third = allocator.allocate(2).expect("allocate 2 bytes").as_ptr();
  print_alloc("[3]", 2, third);
  println!(
    "[3] third == first? {}",
    if third == first {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A large request moves the program break.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  let big = allocator.allocate(64 * 1024).expect("allocate 64 KiB").as_ptr();
  print_alloc("[4]", 64 * 1024, big);
  print_program_break("after large alloc");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Freeing everything hands the trailing pages back.
  // --------------------------------------------------------------------
  unsafe {
    allocator.free(big);
    allocator.free(second);
    allocator.free(third);
  }
  print_program_break("after frees");
  println!("\n[5] {:?}", allocator.stats());
  print!("{allocator}");
}
