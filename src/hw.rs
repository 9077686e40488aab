/// The hardware/bootstrap seam — everything outside this core's job,
/// named here only as opaque interfaces.
///
/// Nothing in this module is implemented by this crate: the bootstrap
/// path, GDT/IDT setup, the PIT, the syscall dispatcher, the user-mode
/// trampoline and the text console all live elsewhere. This core only
/// ever calls through these declarations; it never defines them.

/// Registers per `registers_t` in the original tutorial's `isr.h` —
/// only the fields `page_fault` actually reads are kept.
#[repr(C)]
pub struct InterruptRegisters {
    pub err_code: u32,
}

extern "C" {
    /// Linker-provided end of the loaded kernel image.
    static end: u8;

    /// Installs `handler` at interrupt vector `vec`.
    pub fn register_interrupt_handler(vec: u8, handler: extern "C" fn(&InterruptRegisters));

    /// Writes the TSS `esp0` field — the stack the CPU switches to on a
    /// ring3 -> ring0 transition.
    pub fn set_kernel_stack(top: u32);

    /// Physically-addressed 4 KiB copy. Disables paging for the
    /// duration of the copy so `src`/`dst` can be read as raw physical
    /// addresses.
    pub fn copy_page_physical(src_phys: u32, dst_phys: u32);

    /// Returns the address of the instruction immediately after the
    /// call to `read_eip` — the splice point `fork`/`switch_task` use to
    /// tell a fresh call apart from a resumed one.
    pub fn read_eip() -> u32;

    /// Loads (CR3, ESP, EBP) and jumps to `eip`. Never returns through
    /// the normal call stack — execution resumes at `eip` with `EAX`
    /// (or whatever register the ABI maps return values to) holding
    /// `task::RESUME_SENTINEL`.
    pub fn resume(eip: u32, ebp: u32, esp: u32, cr3: u32) -> !;

    /// Opaque text console write — the only logging sink this crate
    /// assumes exists.
    pub fn monitor_write(bytes: *const u8, len: usize);
}

/// Physical address of the linker-provided end-of-kernel symbol.
pub fn kernel_end() -> u32 {
    unsafe { &end as *const u8 as u32 }
}
