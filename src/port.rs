//! Cortex-M port — SysTick preemption and the context-switch primitive
//!
//! The only code in the crate that touches the stack pointer directly.
//! Everything below depends on the frame layout in `context`:
//!
//! - the CPU stacks R0-R3, R12, LR, PC, xPSR on exception entry,
//! - `SysTick` pushes R4-R11 below that, so the saved stack top points at R4,
//! - `start_first_task` unwinds the same 16 words without an exception.
//!
//! Tasks run in privileged thread mode on the main stack, so every task
//! takes the same EXC_RETURN (0xFFFF_FFF9) and the handler can carry it in
//! a register across the switch. Requires ARMv7-M (`push {r4-r11}` is not
//! encodable on ARMv6-M).
//!
//! Author: Moroya Sakamoto

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use log::error;

use crate::config::CLOCK_HZ;
use crate::error::KernelError;
use crate::kernel::{Kernel, KernelCell};
use crate::task::TaskFn;
use crate::timer::{TickConfig, TickSource};

/// The kernel. Touched only through `KERNEL.with`.
static KERNEL: KernelCell = KernelCell::new(Kernel::new(CLOCK_HZ));

/// SysTick programmed from a `TickConfig`
pub struct SysTickSource<'a> {
    syst: &'a mut SYST,
    scb: &'a mut SCB,
}

impl<'a> SysTickSource<'a> {
    pub fn new(syst: &'a mut SYST, scb: &'a mut SCB) -> Self {
        Self { syst, scb }
    }
}

impl TickSource for SysTickSource<'_> {
    fn arm(&mut self, config: &TickConfig) {
        self.syst.disable_counter();
        self.syst.clear_current();
        // SAFETY: SysTick only drives the context switch; changing its
        // priority cannot break a priority-based critical section because
        // the kernel uses PRIMASK, not BASEPRI.
        unsafe { self.scb.set_priority(SystemHandler::SysTick, config.priority()) };
        self.syst.set_reload(config.reload());
        self.syst.set_clock_source(SystClkSource::Core);
        self.syst.enable_interrupt();
        self.syst.enable_counter();
    }
}

/// Register the application tasks. Must run before `launch`.
pub fn add_threads(entries: &[TaskFn]) -> Result<usize, KernelError> {
    KERNEL.with(|kernel| kernel.add_threads(entries))
}

/// Start SysTick with `period_us` slices and jump into task 0.
///
/// Never returns. A launch error (nothing registered, second launch,
/// unusable period, smashed stack guard) halts via panic: after this call
/// there is no caller left to report to.
pub fn launch(period_us: u32) -> ! {
    cortex_m::interrupt::disable();

    // SAFETY: from here on the kernel is the sole owner of SysTick; SCB is
    // only used to set the SysTick priority.
    let mut peripherals = unsafe { cortex_m::Peripherals::steal() };
    let mut tick = SysTickSource::new(&mut peripherals.SYST, &mut peripherals.SCB);

    let sp = match KERNEL.with(|kernel| kernel.bootstrap(&mut tick, period_us)) {
        Ok(sp) => sp,
        Err(e) => {
            error!("launch failed: {}", e);
            panic!("launch failed: {}", e);
        }
    };

    // SAFETY: `sp` is the stack top of task 0's synthetic context built by
    // `add_threads`, inside the static kernel.
    unsafe { start_first_task(sp as u32) }
}

/// Steps 2-4 of a switch, called from `SysTick` with R4-R11 already saved.
extern "C" fn select_next_context(sp: u32) -> u32 {
    KERNEL.with(|kernel| kernel.switch(sp as usize) as u32)
}

/// Restore-only bootstrap.
///
/// Unwinds the synthetic context at `sp` by hand: R4-R11, R0-R3, R12, then
/// LR from the LR slot (the return trap), PC into R0, xPSR discarded. The
/// Thumb bit cleared in the PC slot is set again for `bx`.
#[unsafe(naked)]
unsafe extern "C" fn start_first_task(sp: u32) -> ! {
    naked_asm!(
        "mov   sp, r0",
        "pop   {{r4-r11}}",
        "pop   {{r0-r3}}",
        "pop   {{r12}}",
        "ldr   lr, [sp, #0]",
        "ldr   r0, [sp, #4]",
        "add   sp, sp, #12",
        "orr   r0, r0, #1",
        "cpsie i",
        "bx    r0",
    );
}

/// SysTick handler: the context switch.
///
/// On entry the CPU has stacked the outgoing task's hardware frame on its
/// own stack and LR holds EXC_RETURN. R4 carries EXC_RETURN across the call
/// into Rust (callee-saved), and is then reloaded from the incoming frame.
/// No other register is live.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn SysTick() {
    naked_asm!(
        "cpsid i",
        "push  {{r4-r11}}",
        "mov   r0, sp",
        "mov   r4, lr",
        "bl    {select}",
        "mov   lr, r4",
        "mov   sp, r0",
        "pop   {{r4-r11}}",
        "cpsie i",
        "bx    lr",
        select = sym select_next_context,
    );
}
