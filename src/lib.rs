//! rr-kernel — preemptive round-robin kernel for single-core Cortex-M
//!
//! Time-slices a fixed set of task bodies on one core:
//! - Static task stacks and TCB ring (no heap, no allocation)
//! - SysTick-driven preemption, strict round robin, no priorities
//! - Naked SysTick handler saving R4-R11 over the hardware exception frame
//! - Restore-only bootstrap into task 0
//!
//! ```ignore
//! fn blink() -> ! { loop { /* ... */ } }
//! fn sense() -> ! { loop { /* ... */ } }
//!
//! rr_kernel::port::add_threads(&[blink, sense]).unwrap();
//! rr_kernel::port::launch(10_000); // 10 ms slices, never returns
//! ```
//!
//! Author: Moroya Sakamoto

#![no_std]

pub mod config;
pub mod error;
pub mod context;
pub mod task;
pub mod scheduler;
pub mod timer;
pub mod kernel;
#[cfg(all(feature = "cortex-m", target_arch = "arm"))]
pub mod port;

pub use context::{ContextFrame, TaskStack};
pub use error::KernelError;
pub use kernel::{Kernel, KernelCell, Phase};
pub use scheduler::TcbRing;
pub use task::{Tcb, TaskFn, TaskState};
pub use timer::{SoftwareTick, TickConfig, TickSource};
