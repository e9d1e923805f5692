//! Task definition — entry points and task control blocks
//!
//! Tasks are registered once, before launch, and run forever. A task body
//! is an ordinary diverging function; it never sees its own suspension.
//!
//! Author: Moroya Sakamoto

/// Task entry point — takes nothing, never returns
pub type TaskFn = fn() -> !;

/// Code address of a task entry point as it appears in a saved PC slot
/// (before the Thumb bit is cleared).
pub fn entry_address(entry: TaskFn) -> u32 {
    entry as usize as u32
}

/// Task execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Owns the CPU until the next tick
    Running,
    /// Context saved on its stack, waiting for its turn in the ring
    Suspended,
}

/// Task control block — 2 words
///
/// `next` is an index into the same ring, so the ring is a plain array
/// with no self-referential pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tcb {
    /// Saved stack pointer (lowest word of the saved context)
    pub(crate) stack_top: usize,
    /// Ring successor
    pub(crate) next: usize,
}

impl Tcb {
    /// Unlinked slot
    pub const fn empty() -> Self {
        Self { stack_top: 0, next: 0 }
    }

    /// Saved stack pointer of this task.
    pub fn stack_top(&self) -> usize {
        self.stack_top
    }

    /// Index of the task that runs after this one.
    pub fn next(&self) -> usize {
        self.next
    }
}

/// Landing site for the LR slot of every synthetic context.
///
/// A `TaskFn` cannot return, so reaching this means a saved frame was
/// corrupted. Fatal.
pub(crate) extern "C" fn task_returned() -> ! {
    log::error!("task returned into the kernel trap");
    panic!("task returned");
}
