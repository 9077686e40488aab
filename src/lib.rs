#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

//! Memory-and-task core of a minimal 32-bit x86 protected-mode kernel:
//! the physical frame allocator, paging, the kernel heap, and the
//! cooperative/preemptive task switcher. The bootstrap/entry path,
//! GDT/IDT setup, the console, the timer, and the syscall dispatcher
//! are out of scope — see `hw` for the seam where this core calls out
//! to them.

// Hardware-dependent modules — only compiled for the bare-metal target.
#[cfg(target_os = "none")]
pub mod hw;
#[cfg(target_os = "none")]
pub mod io;

// `panic` itself is always compiled: its macros are the fatal-invariant
// call sites used by the always-compiled `mem` modules, with a
// host-side fallback (plain `panic!`) for `cargo test` builds that
// never touch the console or inline asm.
pub mod panic;

// `mem` and `task` are always compiled: only the specific functions
// inside that touch asm/CR0/CR3 or the `hw` collaborators are
// individually gated to `target_os = "none"`, so the bitmap,
// page-table, heap-bookkeeping, and task-queue logic all run under
// `cargo test` on the host.
pub mod klib;
pub mod mem;
pub mod task;
