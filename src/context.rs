//! Execution context store — saved-register frames and per-task stacks
//!
//! A suspended task is fully described by its stack: the switch routine
//! leaves the stack pointer on the lowest word of a 16-word context frame.
//!
//! ```text
//! high  ┌──────────┐ ← end of TaskStack
//!       │ xPSR     │ 15 ┐
//!       │ PC       │ 14 │
//!       │ LR       │ 13 │ hardware frame (stacked on exception entry)
//!       │ R12      │ 12 │
//!       │ R3..R0   │ 8  ┘
//!       │ R11..R4  │ 0  ┐ software frame (push {r4-r11} in SysTick)
//! low   └──────────┘ ← saved stack top (TCB)
//! ```
//!
//! Frame order is fixed by the ARMv7-M exception-entry convention and by the
//! `push`/`pop` register lists in the port. The `#[repr(C)]` structs below
//! are the single description of that layout; tests pin every offset.
//!
//! Author: Moroya Sakamoto

use core::cell::UnsafeCell;
use core::mem::{offset_of, size_of};

use crate::config::STACK_GUARD;
use crate::task::{entry_address, task_returned, TaskFn};

/// xPSR with only the Thumb execution-state bit set.
pub const XPSR_THUMB: u32 = 1 << 24;

/// Bytes per stacked register.
pub const WORD_BYTES: usize = size_of::<u32>();

/// Registers pushed and popped by the switch routine itself.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareFrame {
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
}

/// Registers the CPU stacks on exception entry and unstacks on return.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

/// Complete saved context, lowest address first.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextFrame {
    pub software: SoftwareFrame,
    pub hardware: HardwareFrame,
}

pub const SOFTWARE_FRAME_WORDS: usize = size_of::<SoftwareFrame>() / WORD_BYTES;
pub const HARDWARE_FRAME_WORDS: usize = size_of::<HardwareFrame>() / WORD_BYTES;
pub const CONTEXT_WORDS: usize = size_of::<ContextFrame>() / WORD_BYTES;

const HW_BASE: usize = offset_of!(ContextFrame, hardware) / WORD_BYTES;

impl ContextFrame {
    /// Word index of the saved LR, relative to the saved stack top.
    pub const LR_WORD: usize = HW_BASE + offset_of!(HardwareFrame, lr) / WORD_BYTES;
    /// Word index of the saved PC.
    pub const PC_WORD: usize = HW_BASE + offset_of!(HardwareFrame, pc) / WORD_BYTES;
    /// Word index of the saved xPSR.
    pub const XPSR_WORD: usize = HW_BASE + offset_of!(HardwareFrame, xpsr) / WORD_BYTES;

    /// Context of a task that has never run, as if it had been interrupted
    /// on the first instruction of `entry`.
    ///
    /// PC carries the entry address with the Thumb bit cleared (exception
    /// return requires a halfword-aligned PC; the Thumb state comes from
    /// xPSR). LR points at the `task_returned` trap. All other registers
    /// are zero.
    pub fn synthetic(entry: TaskFn) -> Self {
        Self {
            software: SoftwareFrame::default(),
            hardware: HardwareFrame {
                lr: task_returned as usize as u32,
                pc: entry_address(entry) & !1,
                xpsr: XPSR_THUMB,
                ..HardwareFrame::default()
            },
        }
    }

    fn to_words(self) -> [u32; CONTEXT_WORDS] {
        let s = self.software;
        let h = self.hardware;
        [
            s.r4, s.r5, s.r6, s.r7, s.r8, s.r9, s.r10, s.r11,
            h.r0, h.r1, h.r2, h.r3, h.r12, h.lr, h.pc, h.xpsr,
        ]
    }

    fn from_words(w: [u32; CONTEXT_WORDS]) -> Self {
        Self {
            software: SoftwareFrame {
                r4: w[0], r5: w[1], r6: w[2], r7: w[3],
                r8: w[4], r9: w[5], r10: w[6], r11: w[7],
            },
            hardware: HardwareFrame {
                r0: w[8], r1: w[9], r2: w[10], r3: w[11],
                r12: w[12], lr: w[13], pc: w[14], xpsr: w[15],
            },
        }
    }
}

/// Statically sized stack owned by exactly one task.
///
/// The words are behind an `UnsafeCell` because the CPU writes them through
/// the hardware stack pointer while no Rust reference is involved. The kernel
/// only touches a stack before launch, or for the outgoing task inside the
/// switch critical section.
#[repr(C, align(8))]
pub struct TaskStack<const W: usize> {
    words: UnsafeCell<[u32; W]>,
}

impl<const W: usize> TaskStack<W> {
    const LAYOUT_OK: () = {
        assert!(W > CONTEXT_WORDS, "stack must hold the guard word and a full context");
        assert!(W % 2 == 0, "stack end must stay 8-byte aligned");
    };

    /// Zeroed stack (guard word is written by `init_context`).
    pub const fn new() -> Self {
        let () = Self::LAYOUT_OK;
        Self {
            words: UnsafeCell::new([0; W]),
        }
    }

    /// Stack depth in words.
    pub const fn words(&self) -> usize {
        W
    }

    /// Address of the lowest word.
    pub fn base(&self) -> usize {
        self.words.get() as usize
    }

    /// One past the highest word (initial full-descending SP).
    pub fn end(&self) -> usize {
        self.base() + W * WORD_BYTES
    }

    /// Stack top of a freshly initialized context.
    pub fn initial_top(&self) -> usize {
        self.base() + (W - CONTEXT_WORDS) * WORD_BYTES
    }

    /// Does `sp` point at a full context inside this stack?
    pub fn holds_context(&self, sp: usize) -> bool {
        sp >= self.base() + WORD_BYTES
            && sp <= self.initial_top()
            && sp % WORD_BYTES == 0
    }

    /// Read one word by index from the stack base.
    pub fn word(&self, index: usize) -> u32 {
        assert!(index < W);
        // SAFETY: index is in bounds; the cell owns the memory.
        unsafe { self.words.get().cast::<u32>().add(index).read_volatile() }
    }

    fn set_word(&self, index: usize, value: u32) {
        assert!(index < W);
        // SAFETY: index is in bounds; callers hold the kernel critical
        // section and the task owning this stack is not running.
        unsafe { self.words.get().cast::<u32>().add(index).write_volatile(value) }
    }

    /// Is the guard word at the stack base still intact?
    pub fn guard_intact(&self) -> bool {
        self.word(0) == STACK_GUARD
    }

    /// Build the synthetic "just interrupted" context for `entry`.
    ///
    /// Returns the stack top to record in the task's TCB. Running it twice
    /// produces the same stack contents and the same stack top.
    pub(crate) fn init_context(&self, entry: TaskFn) -> usize {
        let first = W - CONTEXT_WORDS;
        for (i, w) in ContextFrame::synthetic(entry).to_words().into_iter().enumerate() {
            self.set_word(first + i, w);
        }
        self.set_word(0, STACK_GUARD);
        self.initial_top()
    }

    /// Decode the context saved at `sp`.
    pub fn frame_at(&self, sp: usize) -> Option<ContextFrame> {
        if !self.holds_context(sp) {
            return None;
        }
        let first = (sp - self.base()) / WORD_BYTES;
        let mut words = [0u32; CONTEXT_WORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = self.word(first + i);
        }
        Some(ContextFrame::from_words(words))
    }
}

impl<const W: usize> Default for TaskStack<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STACK_WORDS;

    fn spin() -> ! {
        loop {
            core::hint::black_box(1);
        }
    }

    fn other() -> ! {
        loop {
            core::hint::black_box(2);
        }
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(SOFTWARE_FRAME_WORDS, 8);
        assert_eq!(HARDWARE_FRAME_WORDS, 8);
        assert_eq!(CONTEXT_WORDS, 16);
    }

    #[test]
    fn test_frame_offsets_match_exception_stacking() {
        // push {r4-r11} stores r4 at the lowest address
        assert_eq!(offset_of!(SoftwareFrame, r4), 0);
        assert_eq!(offset_of!(SoftwareFrame, r11), 28);
        // ARMv7-M basic frame: r0 r1 r2 r3 r12 lr pc xpsr
        assert_eq!(offset_of!(HardwareFrame, r0), 0);
        assert_eq!(offset_of!(HardwareFrame, r12), 16);
        assert_eq!(offset_of!(HardwareFrame, lr), 20);
        assert_eq!(offset_of!(HardwareFrame, pc), 24);
        assert_eq!(offset_of!(HardwareFrame, xpsr), 28);
        assert_eq!(offset_of!(ContextFrame, hardware), 32);
        assert_eq!(ContextFrame::LR_WORD, 13);
        assert_eq!(ContextFrame::PC_WORD, 14);
        assert_eq!(ContextFrame::XPSR_WORD, 15);
    }

    #[test]
    fn test_init_context_stack_top() {
        let stack: TaskStack<STACK_WORDS> = TaskStack::new();
        let top = stack.init_context(spin);
        assert_eq!(top, stack.base() + (STACK_WORDS - CONTEXT_WORDS) * 4);
        assert_eq!(top % 8, 0);
    }

    #[test]
    fn test_init_context_slots() {
        let stack: TaskStack<STACK_WORDS> = TaskStack::new();
        stack.init_context(spin);
        assert_eq!(stack.word(STACK_WORDS - 1), XPSR_THUMB);
        assert_eq!(stack.word(STACK_WORDS - 1) & !XPSR_THUMB, 0);
        assert_eq!(stack.word(STACK_WORDS - 2), entry_address(spin) & !1);
        assert_eq!(stack.word(STACK_WORDS - 3), task_returned as usize as u32);
        assert!(stack.guard_intact());
    }

    #[test]
    fn test_init_context_idempotent() {
        let stack: TaskStack<32> = TaskStack::new();
        let first_top = stack.init_context(spin);
        let first: [u32; 32] = core::array::from_fn(|i| stack.word(i));

        // dirty the context as a running task would
        stack.set_word(20, 0x1234_5678);
        stack.set_word(31, 0);
        stack.init_context(other);
        let second_top = stack.init_context(spin);
        let second: [u32; 32] = core::array::from_fn(|i| stack.word(i));

        assert_eq!(first_top, second_top);
        assert_eq!(first, second);
    }

    #[test]
    fn test_frame_at_decodes_synthetic() {
        let stack: TaskStack<STACK_WORDS> = TaskStack::new();
        let top = stack.init_context(spin);
        let frame = stack.frame_at(top).unwrap();
        assert_eq!(frame, ContextFrame::synthetic(spin));
        assert_eq!(frame.hardware.pc, entry_address(spin) & !1);
        assert_eq!(frame.hardware.xpsr, XPSR_THUMB);
    }

    #[test]
    fn test_frame_at_rejects_foreign_pointer() {
        let stack: TaskStack<STACK_WORDS> = TaskStack::new();
        stack.init_context(spin);
        assert!(stack.frame_at(stack.end()).is_none());
        assert!(stack.frame_at(stack.base()).is_none());
        assert!(stack.frame_at(stack.initial_top() + 2).is_none());
    }

    #[test]
    fn test_guard_detects_overflow() {
        let stack: TaskStack<STACK_WORDS> = TaskStack::new();
        assert!(!stack.guard_intact());
        stack.init_context(spin);
        assert!(stack.guard_intact());
        stack.set_word(0, 0);
        assert!(!stack.guard_intact());
    }
}
