//! Compile-time kernel configuration
//!
//! Everything is fixed at build time: task capacity, stack depth, core clock.
//! `Kernel<N, W>` takes the first two as const generics defaulting to the
//! values below.

/// Task slots. The reference board application uses three, the fourth is spare.
pub const MAX_TASKS: usize = 4;

/// Per-task stack depth in 32-bit words.
///
/// Must cover the 16-word saved context, the guard word and the deepest call
/// chain of the task body. An undersized stack overflows silently into the
/// neighbouring task's stack; the guard word only detects it after the fact.
pub const STACK_WORDS: usize = 100;

/// Core clock frequency in Hz (STM32F4 HSI after reset).
pub const CLOCK_HZ: u32 = 16_000_000;

/// Raw NVIC priority byte for SysTick.
///
/// 0xFF is the lowest priority on every Cortex-M regardless of how many
/// priority bits the silicon implements.
pub const TICK_PRIORITY: u8 = 0xFF;

/// Sentinel stored in the lowest word of every task stack.
pub const STACK_GUARD: u32 = 0xDEAD_BEEF;
