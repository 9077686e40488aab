#![no_std]
#![no_main]
#![allow(dead_code)]

//! Entry point. Everything before `rust_main` (the multiboot/GRUB
//! trampoline, GDT/IDT setup) is the out-of-scope bootstrap path spec §1
//! names — this binary only picks up from the point where a 32-bit
//! protected-mode environment with a loaded kernel image already exists.

use core::arch::asm;
use core::panic::PanicInfo;

use protokernel::{mem, printkln, task};

#[panic_handler]
fn rust_panic(info: &PanicInfo) -> ! {
    unsafe { asm!("cli") };

    printkln!();
    printkln!("!!! RUST PANIC !!!");
    if let Some(location) = info.location() {
        printkln!("  at {}:{}", location.file(), location.line());
    }

    protokernel::klib::stack::print_stack();

    printkln!();
    printkln!("System halted.");

    loop {
        unsafe { asm!("cli; hlt") };
    }
}

/// `multiboot_info_addr` is accepted for ABI compatibility with the
/// out-of-scope entry assembly but unused: spec §2/§3 fix physical
/// memory at a 16 MiB compile-time constant rather than reading a
/// multiboot memory map. `initial_stack` is the boot-time ESP, handed in
/// by that same out-of-scope assembly — spec §4.6's `initial_esp`.
#[no_mangle]
pub extern "C" fn rust_main(_multiboot_info_addr: u32, initial_stack: u32) -> ! {
    printkln!("=== Memory/Task Core Init ===");

    unsafe {
        mem::init();
    }
    printkln!(
        "  heap: [{:#x}, {:#x}) max {:#x}",
        mem::KHEAP_START,
        mem::KHEAP_START + mem::KHEAP_INITIAL_SIZE,
        mem::KHEAP_MAX
    );

    // Clone the kernel directory as the first user directory, per the
    // control flow in spec §2, then switch to it before tasking comes
    // up — every task from here on is a descendant of this clone, never
    // of the kernel directory itself.
    unsafe {
        let initial_directory = mem::paging::clone_directory(mem::paging::kernel_directory());
        mem::paging::switch_page_directory(initial_directory);

        task::initialise_tasking(initial_stack);
    }

    printkln!("  task 1 (pid {}) running", task::getpid());
    printkln!("=== Init Complete ===");

    // Entering the scheduler and user mode (spec §2's last step) needs
    // the PIT and the syscall dispatcher to drive `switch_task`/
    // `switch_to_user_mode` — both out of scope (spec §1). This core's
    // job ends here; an external scheduler hook calls back into
    // `task::switch_task` from the timer ISR.
    loop {
        unsafe { asm!("hlt") };
    }
}
