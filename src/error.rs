//! Kernel error type
//!
//! Only the pre-launch API reports errors. Once `launch` has transferred
//! control into task 0 there is nobody left to return to, so the hardware
//! entry points turn these into a fatal halt.

use thiserror::Error;

/// Contract violation or misconfiguration detected by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    /// `add_threads` got an empty list, or `launch` ran before registration.
    #[error("no tasks registered")]
    NoTasks,
    /// More entry points than task slots.
    #[error("{requested} tasks requested, capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },
    /// Task index outside the registered range.
    #[error("task {task} out of range ({count} registered)")]
    InvalidTask { task: usize, count: usize },
    /// Registration or launch after the scheduler started.
    #[error("scheduler already launched")]
    AlreadyLaunched,
    /// Operation needs registered tasks that have not been set up.
    #[error("tasks not registered")]
    NotRegistered,
    /// Tick period yields no timer cycles.
    #[error("tick period of {period_us} us is too short")]
    InvalidPeriod { period_us: u32 },
    /// Reload value does not fit the 24-bit SysTick counter.
    #[error("reload value {reload:#x} exceeds the 24-bit SysTick range")]
    ReloadOutOfRange { reload: u64 },
    /// Guard word at the bottom of a task stack was overwritten.
    #[error("stack overflow in task {task}")]
    StackOverflow { task: usize },
}
