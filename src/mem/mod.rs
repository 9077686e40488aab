//! Memory management core: the placement allocator, the physical frame
//! bitmap, paging, and the kernel heap.
//!
//! This module is the orchestrator: it owns the shared compile-time
//! constants, the `align_up`/`align_down` helpers every sub-module
//! shares, the boot-sequence `init` that wires placement → paging →
//! heap together, and the `kmalloc`/`kfree` family that dispatches
//! between the placement allocator and the heap depending on whether
//! the heap has been constructed yet.

pub mod ordered_index;
pub mod frame;
pub mod paging;
pub mod placement;
pub mod heap;

#[cfg(target_os = "none")]
use spin::Mutex;

/// Size of a page/frame.
pub const PAGE_SIZE: u32 = 0x1000;

/// Virtual base of the kernel heap.
pub const KHEAP_START: u32 = 0xC000_0000;
/// Initial size of the kernel heap, backed by real frames before the
/// heap is constructed.
pub const KHEAP_INITIAL_SIZE: u32 = 0x0010_0000;
/// Highest address the heap may ever grow `end_address` to.
pub const KHEAP_MAX: u32 = 0xCFFF_F000;

/// Rounds `addr` up to the next multiple of `align` (`align` a power of two).
pub fn align_up(addr: u32, align: u32) -> u32 {
    (addr + align - 1) & !(align - 1)
}

/// Rounds `addr` down to the previous multiple of `align`.
pub fn align_down(addr: u32, align: u32) -> u32 {
    addr & !(align - 1)
}

// ---- The kernel heap singleton ------------------------------------------
//
// Only ever constructed once `mem::init` has run. Before that, every
// `kmalloc*` call is served by `placement`.

#[cfg(target_os = "none")]
static KHEAP: Mutex<Option<heap::Heap<'static, heap::PagingBackend>>> = Mutex::new(None);

#[cfg(target_os = "none")]
fn heap_exists() -> bool {
    KHEAP.lock().is_some()
}

/// Builds the kernel heap in-place at `KHEAP_START`: the ordered index
/// is hosted at the heap's own base, `start` is advanced past it and
/// rounded up to the next page, and the remaining
/// `[start, KHEAP_START+KHEAP_INITIAL_SIZE)` becomes the first hole.
///
/// # Safety
/// Must run exactly once, after `paging::init` has already mapped and
/// frame-backed `[KHEAP_START, KHEAP_START+KHEAP_INITIAL_SIZE)`.
#[cfg(target_os = "none")]
unsafe fn create_heap() {
    let index_entries = heap::HEAP_INDEX_SIZE as usize;
    let index_bytes = (index_entries * core::mem::size_of::<u32>()) as u32;

    let index_storage = core::slice::from_raw_parts_mut(
        KHEAP_START as *mut u32,
        index_entries,
    );

    let start = align_up(KHEAP_START + index_bytes, PAGE_SIZE);
    let end = KHEAP_START + KHEAP_INITIAL_SIZE;

    let heap = heap::Heap::create(
        index_storage,
        start,
        end,
        KHEAP_MAX,
        true,
        false,
        heap::PagingBackend,
    );

    *KHEAP.lock() = Some(heap);
}

/// Internal dispatch shared by `kmalloc`/`kmalloc_align`/`kmalloc_phys`/
/// `kmalloc_ap`: before the heap exists, bump the placement pointer
/// (optionally page-aligned first) and report the placement address as
/// the physical address (true while the kernel image is identity
/// mapped); once the heap exists, delegate to it and resolve the
/// physical address, if requested, through the active page directory.
#[cfg(target_os = "none")]
fn kmalloc_int(sz: u32, align: bool, phys_out: Option<&mut u32>) -> u32 {
    if !heap_exists() {
        let addr = placement::alloc_placement(sz, align);
        if let Some(phys) = phys_out {
            *phys = addr;
        }
        return addr;
    }

    let addr = KHEAP.lock().as_mut().unwrap().alloc(sz, align);
    if let Some(phys) = phys_out {
        *phys = unsafe {
            let dir = paging::current_directory();
            match paging::get_page(addr, false, dir) {
                Some(pte) => (*pte).physical_addr() + (addr & (PAGE_SIZE - 1)),
                None => 0,
            }
        };
    }
    addr
}

#[cfg(target_os = "none")]
pub fn kmalloc(sz: u32) -> u32 {
    kmalloc_int(sz, false, None)
}

#[cfg(target_os = "none")]
pub fn kmalloc_align(sz: u32) -> u32 {
    kmalloc_int(sz, true, None)
}

#[cfg(target_os = "none")]
pub fn kmalloc_phys(sz: u32) -> (u32, u32) {
    let mut phys = 0;
    let addr = kmalloc_int(sz, false, Some(&mut phys));
    (addr, phys)
}

#[cfg(target_os = "none")]
pub fn kmalloc_ap(sz: u32) -> (u32, u32) {
    let mut phys = 0;
    let addr = kmalloc_int(sz, true, Some(&mut phys));
    (addr, phys)
}

/// Frees a heap allocation. A no-op for placement allocations (never
/// freed) and for addresses outside the heap's current range.
#[cfg(target_os = "none")]
pub fn kfree(addr: u32) {
    if addr == 0 {
        return;
    }
    if let Some(heap) = KHEAP.lock().as_mut() {
        heap.free(addr);
    }
}

/// Boot-sequence orchestrator: seed the placement allocator at the
/// linker-provided end of the kernel image, build the kernel page
/// directory and enable paging, then construct the heap, switching
/// every subsequent `kmalloc` over to heap mode.
///
/// # Safety
/// Must run exactly once, very early in boot, before tasking is
/// touched.
#[cfg(target_os = "none")]
pub unsafe fn init() {
    placement::init(crate::hw::kernel_end());
    paging::init(KHEAP_START, KHEAP_INITIAL_SIZE);
    create_heap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_boundary() {
        assert_eq!(align_up(0x1001, 0x1000), 0x2000);
        assert_eq!(align_up(0x1000, 0x1000), 0x1000);
    }

    #[test]
    fn align_down_rounds_to_previous_boundary() {
        assert_eq!(align_down(0x1FFF, 0x1000), 0x1000);
        assert_eq!(align_down(0x1000, 0x1000), 0x1000);
    }
}
