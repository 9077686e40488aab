/// Freestanding helpers with no libc underneath them — bare-metal only.
/// Under `cargo test` the crate links against `std`, which already
/// provides `memset`/`memcpy`; a second `#[no_mangle] extern "C"`
/// definition of either would clash with libc's.

// Freestanding `memset`/`memcpy` — no libc to link against.
#[cfg(target_os = "none")]
pub mod memory;

// Walks the EBP chain and prints through the console — bare-metal only.
#[cfg(target_os = "none")]
pub mod stack;
