//! Tick timer — periodic preemption source
//!
//! Turns a tick period into a SysTick reload value and arms a tick source
//! with it. Preemption cadence comes only from here; there is no yield.
//! On real hardware the source is SysTick (see `port`). For testing,
//! `SoftwareTick` records what it was armed with.
//!
//! Author: Moroya Sakamoto

use crate::config::TICK_PRIORITY;
use crate::error::KernelError;

/// Validated timer programming for one tick period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    /// Value loaded into the down-counter (cycles per tick - 1)
    reload: u32,
    /// Raw NVIC priority byte
    priority: u8,
    /// Requested period in microseconds
    period_us: u32,
}

impl TickConfig {
    /// Largest value the 24-bit SysTick reload register accepts
    pub const MAX_RELOAD: u32 = 0x00FF_FFFF;

    /// Compute the reload for `period_us` at `clock_hz`, at the lowest
    /// interrupt priority.
    pub fn new(clock_hz: u32, period_us: u32) -> Result<Self, KernelError> {
        let cycles = clock_hz as u64 * period_us as u64 / 1_000_000;
        // reload 0 never fires an interrupt
        if cycles < 2 {
            return Err(KernelError::InvalidPeriod { period_us });
        }
        let reload = cycles - 1;
        if reload > Self::MAX_RELOAD as u64 {
            return Err(KernelError::ReloadOutOfRange { reload });
        }
        Ok(Self {
            reload: reload as u32,
            priority: TICK_PRIORITY,
            period_us,
        })
    }

    pub fn reload(&self) -> u32 {
        self.reload
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    /// Core clock cycles per tick
    pub fn cycles(&self) -> u32 {
        self.reload + 1
    }

    /// Tick frequency in Hz
    pub fn frequency_hz(&self) -> f32 {
        1_000_000.0 / self.period_us as f32
    }
}

/// Something that can be armed to interrupt periodically
pub trait TickSource {
    /// Stop, reprogram and restart the periodic interrupt.
    fn arm(&mut self, config: &TickConfig);
}

/// Tick source for host testing
///
/// Records the configuration it was armed with and counts simulated ticks.
#[derive(Debug, Default)]
pub struct SoftwareTick {
    armed: Option<TickConfig>,
    ticks: u64,
}

impl SoftwareTick {
    pub const fn new() -> Self {
        Self { armed: None, ticks: 0 }
    }

    /// Configuration from the last `arm`
    pub fn armed(&self) -> Option<&TickConfig> {
        self.armed.as_ref()
    }

    /// Simulate one timer expiry. Returns false when not armed.
    pub fn fire(&mut self) -> bool {
        if self.armed.is_none() {
            return false;
        }
        self.ticks += 1;
        true
    }

    /// Ticks fired since arming
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated time since arming in microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.armed
            .map(|c| c.period_us as u64 * self.ticks)
            .unwrap_or(0)
    }
}

impl TickSource for SoftwareTick {
    fn arm(&mut self, config: &TickConfig) {
        self.armed = Some(*config);
        self.ticks = 0;
    }
}
