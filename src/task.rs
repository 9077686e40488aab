//! Tasking — a circular ready queue of tasks, each carrying its own
//! page directory, switched to cooperatively by the timer ISR's
//! steady-state call to `switch_task` and eagerly by `fork`'s EIP-splice
//! trick.
//!
//! The `read_eip`/sentinel discrimination that lets `fork` and
//! `switch_task` tell a fresh call apart from a resumed one is named
//! here as `RESUME_SENTINEL`, and the ready queue is a `*mut Task`
//! chain guarded by the same `spin::Mutex<Option<TaskPtr>>` pattern
//! `mem::paging` already uses for `KERNEL_DIRECTORY`/`CURRENT_DIRECTORY`.
//!
//! Like `mem::frame`/`mem::paging`, only the functions that actually
//! touch asm or the `hw` collaborators are gated to `target_os = "none"`
//! — the `Task` record, the ready-queue bookkeeping and the pid counter
//! are plain logic and stay host-testable.

use core::mem::size_of;
use core::ptr;

use spin::Mutex;

use crate::mem::paging::PageDirectory;

#[cfg(target_os = "none")]
use core::arch::asm;
#[cfg(target_os = "none")]
use crate::hw;
#[cfg(target_os = "none")]
use crate::mem;
#[cfg(target_os = "none")]
use crate::mem::frame;
#[cfg(target_os = "none")]
use crate::mem::paging;

/// Size of the kernel-mode stack reserved per task, for
/// `switch_to_user_mode`'s `set_kernel_stack` call.
pub const KERNEL_STACK_SIZE: u32 = 2048;

/// Sentinel `EAX` value `resume` leaves behind for a task that has just
/// been resumed, distinguishing that return from a fresh call to
/// `read_eip`.
pub const RESUME_SENTINEL: u32 = 0x1_2345;

const KERNEL_STACK_TOP: u32 = 0xE000_0000;
const KERNEL_STACK_RELOCATE_SIZE: u32 = 0x5000;

/// A single task: its saved register frame, its own page directory, and
/// a link to the next task in the ready queue.
#[repr(C)]
pub struct Task {
    pub id: u32,
    pub esp: u32,
    pub ebp: u32,
    pub eip: u32,
    pub page_directory: *mut PageDirectory,
    pub next: *mut Task,
    pub kernel_stack: u32,
}

struct TaskPtr(*mut Task);
unsafe impl Send for TaskPtr {}

static CURRENT_TASK: Mutex<Option<TaskPtr>> = Mutex::new(None);
static READY_QUEUE: Mutex<Option<TaskPtr>> = Mutex::new(None);
static NEXT_PID: Mutex<u32> = Mutex::new(1);
static INITIAL_ESP: Mutex<u32> = Mutex::new(0);

/// Assigns the next process id, monotonically, starting at 1.
fn alloc_pid() -> u32 {
    let mut next = NEXT_PID.lock();
    let id = *next;
    *next += 1;
    id
}

fn current_task_ptr() -> *mut Task {
    CURRENT_TASK.lock().as_ref().map_or(ptr::null_mut(), |t| t.0)
}

#[cfg(target_os = "none")]
fn ready_queue_head() -> *mut Task {
    READY_QUEUE
        .lock()
        .as_ref()
        .unwrap_or_else(|| crate::kernel_panic!("tasking not initialised"))
        .0
}

/// Appends `task` to the tail of the ready queue: a freshly forked
/// child always runs after every currently queued peer before the
/// rotation revisits the parent.
///
/// # Safety
/// `task` must point to a live, exclusively-owned `Task` that outlives
/// the queue.
unsafe fn append_to_ready_queue(task: *mut Task) {
    let mut guard = READY_QUEUE.lock();
    match guard.as_ref() {
        None => *guard = Some(TaskPtr(task)),
        Some(head) => {
            let mut tail = head.0;
            while !(*tail).next.is_null() {
                tail = (*tail).next;
            }
            (*tail).next = task;
        }
    }
}

/// The running task's process id, or 0 if tasking hasn't been
/// initialised yet.
pub fn getpid() -> u32 {
    match CURRENT_TASK.lock().as_ref() {
        Some(task) => unsafe { (*task.0).id },
        None => 0,
    }
}

/// Initialises tasking: masks interrupts, relocates the kernel stack
/// to the fixed high address every directory maps, then enrolls the
/// currently-executing context as task 1.
///
/// `initial_esp` is the boot-time stack pointer — captured by the
/// out-of-scope entry path before any nested call, and handed in here
/// rather than read from a global, since the entry path itself is
/// outside this crate's scope.
///
/// # Safety
/// Must run exactly once, after `mem::init` and after `current_directory`
/// has already been switched to a clone of the kernel directory (the
/// orchestrator's job, not this function's).
#[cfg(target_os = "none")]
pub unsafe fn initialise_tasking(initial_esp: u32) {
    asm!("cli");
    *INITIAL_ESP.lock() = initial_esp;

    move_stack(KERNEL_STACK_TOP, KERNEL_STACK_RELOCATE_SIZE);

    let task = mem::kmalloc(size_of::<Task>() as u32) as *mut Task;
    ptr::write(
        task,
        Task {
            id: alloc_pid(),
            esp: 0,
            ebp: 0,
            eip: 0,
            page_directory: paging::current_directory(),
            next: ptr::null_mut(),
            kernel_stack: 0,
        },
    );

    *CURRENT_TASK.lock() = Some(TaskPtr(task));
    *READY_QUEUE.lock() = Some(TaskPtr(task));

    asm!("sti");
}

/// Relocates the executing stack to `[new_top-size, new_top)`, mapping
/// and zeroing every page of the new range, copying the live contents
/// of the old stack across, and rewriting any copied word that looks
/// like a pointer into the old stack so it points into the new one.
///
/// The pointer fix-up is a heuristic: any 32-bit word in the copied
/// region whose value falls in `(old_esp, initial_esp)` gets `offset`
/// added to it, on the assumption that it's a saved frame pointer or a
/// local's address rather than incidental data that happens to alias
/// that range. A robust implementation would need a real stack walker
/// (DWARF unwinding), which this doesn't attempt — the hazard is kept
/// rather than papered over.
///
/// # Safety
/// Must run with interrupts masked and only from the task whose stack is
/// being relocated; the `esp`/`ebp` shuffling at the end depends on no
/// other code observing this function's own frame mid-move.
#[cfg(target_os = "none")]
pub unsafe fn move_stack(new_top: u32, size: u32) {
    let new_bottom = new_top - size;

    let mut addr = new_bottom;
    while addr < new_top {
        let dir = paging::current_directory();
        if let Some(pte) = paging::get_page(addr, true, dir) {
            frame::alloc_frame(&mut *pte, false, true);
        }
        addr += mem::PAGE_SIZE;
    }

    // Flush the TLB for the freshly-mapped range by reloading CR3.
    let cr3: u32;
    asm!("mov {}, cr3", out(reg) cr3);
    asm!("mov cr3, {}", in(reg) cr3);

    ptr::write_bytes(new_bottom as *mut u8, 0, size as usize);

    let old_esp: u32;
    let old_ebp: u32;
    asm!("mov {}, esp", out(reg) old_esp);
    asm!("mov {}, ebp", out(reg) old_ebp);

    let initial_esp = *INITIAL_ESP.lock();
    let offset = new_top - initial_esp;
    let new_esp = old_esp + offset;
    let new_ebp = old_ebp + offset;

    ptr::copy_nonoverlapping(
        old_esp as *const u8,
        new_esp as *mut u8,
        (initial_esp - old_esp) as usize,
    );

    let mut addr = new_bottom;
    while addr < new_top {
        let word = *(addr as *const u32);
        if old_esp < word && word < initial_esp {
            *(addr as *mut u32) = word + offset;
        }
        addr += 4;
    }

    asm!("mov esp, {}", in(reg) new_esp);
    asm!("mov ebp, {}", in(reg) new_ebp);
}

/// Forks the current task: clones its page directory, appends a new
/// task record to the ready queue, then uses the `read_eip` splice to
/// tell the parent's return from the child's. The parent observes
/// `current_task` unchanged and returns the child's id; the child is
/// resumed later by `switch_task` with `current_task` already pointing
/// at its own record, and returns 0.
///
/// # Safety
/// Must run with interrupts masked for its duration, and only from
/// kernel context (spec §5: `fork` is one of the three routines that
/// mask interrupts for its entire body).
#[cfg(target_os = "none")]
pub unsafe fn fork() -> u32 {
    asm!("cli");

    let parent = current_task_ptr();
    let new_directory = paging::clone_directory(paging::current_directory());

    let child = mem::kmalloc(size_of::<Task>() as u32) as *mut Task;
    ptr::write(
        child,
        Task {
            id: alloc_pid(),
            esp: 0,
            ebp: 0,
            eip: 0,
            page_directory: new_directory,
            next: ptr::null_mut(),
            kernel_stack: 0,
        },
    );
    append_to_ready_queue(child);

    let eip = hw::read_eip();

    if current_task_ptr() == parent {
        let esp: u32;
        let ebp: u32;
        asm!("mov {}, esp", out(reg) esp);
        asm!("mov {}, ebp", out(reg) ebp);

        (*child).esp = esp;
        (*child).ebp = ebp;
        (*child).eip = eip;

        asm!("sti");
        return (*child).id;
    }

    0
}

/// Advances the ready queue by one: saves the current task's register
/// frame, selects the next task (wrapping to the head of the queue),
/// and invokes the `resume` primitive to jump into it. The sentinel
/// check at the top is how a just-resumed task recognizes itself and
/// returns immediately instead of re-entering the switch.
///
/// # Safety
/// Must be the sole call site that reaches `hw::resume`; called from
/// the timer ISR at steady state (spec §5).
#[cfg(target_os = "none")]
pub unsafe fn switch_task() {
    let current = current_task_ptr();
    if current.is_null() {
        return;
    }

    let esp: u32;
    let ebp: u32;
    asm!("mov {}, esp", out(reg) esp);
    asm!("mov {}, ebp", out(reg) ebp);

    let eip = hw::read_eip();
    if eip == RESUME_SENTINEL {
        return;
    }

    (*current).eip = eip;
    (*current).esp = esp;
    (*current).ebp = ebp;

    let next = if (*current).next.is_null() {
        ready_queue_head()
    } else {
        (*current).next
    };
    *CURRENT_TASK.lock() = Some(TaskPtr(next));

    let directory = (*next).page_directory;
    paging::set_current_directory(directory);

    hw::resume((*next).eip, (*next).ebp, (*next).esp, (*directory).physical_addr);
}

/// Drops into ring 3 at the instruction following the `iretd`, on the
/// current task's own stack. Masks interrupts for the entire transition
/// (spec §5) and never returns through the normal call stack — execution
/// continues past the inline `2:` label instead.
///
/// # Safety
/// Must run only once tasking and user-mode segments are set up; the
/// caller gives up its kernel-mode privilege irreversibly.
#[cfg(target_os = "none")]
pub unsafe fn switch_to_user_mode() {
    let current = current_task_ptr();
    hw::set_kernel_stack((*current).kernel_stack + KERNEL_STACK_SIZE);

    asm!(
        "cli",
        "mov {tmp:x}, 0x23",
        "mov ds, {tmp:x}",
        "mov es, {tmp:x}",
        "mov fs, {tmp:x}",
        "mov gs, {tmp:x}",
        "mov {esp_tmp}, esp",
        "push 0x23",
        "push {esp_tmp}",
        "pushfd",
        "push 0x1B",
        "push 2f",
        "iretd",
        "2:",
        tmp = out(reg) _,
        esp_tmp = out(reg) _,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_are_assigned_monotonically() {
        *NEXT_PID.lock() = 1;
        assert_eq!(alloc_pid(), 1);
        assert_eq!(alloc_pid(), 2);
        assert_eq!(alloc_pid(), 3);
    }

    #[test]
    fn resume_sentinel_matches_spec_constant() {
        assert_eq!(RESUME_SENTINEL, 0x12345);
    }

    #[test]
    fn getpid_is_zero_before_tasking_starts() {
        // No other test in this module ever populates CURRENT_TASK.
        assert_eq!(getpid(), 0);
    }

    #[test]
    fn ready_queue_append_links_in_order() {
        let mut a = Task {
            id: 1,
            esp: 0,
            ebp: 0,
            eip: 0,
            page_directory: ptr::null_mut(),
            next: ptr::null_mut(),
            kernel_stack: 0,
        };
        let mut b = Task {
            id: 2,
            esp: 0,
            ebp: 0,
            eip: 0,
            page_directory: ptr::null_mut(),
            next: ptr::null_mut(),
            kernel_stack: 0,
        };
        *READY_QUEUE.lock() = None;
        unsafe {
            append_to_ready_queue(&mut a as *mut Task);
            append_to_ready_queue(&mut b as *mut Task);
        }
        let head = READY_QUEUE.lock().as_ref().unwrap().0;
        assert_eq!(unsafe { (*head).id }, 1);
        assert_eq!(unsafe { (*(*head).next).id }, 2);
        *READY_QUEUE.lock() = None;
    }
}
