//! Kernel — top-level scheduler state
//!
//! Groups the task stacks, the TCB ring and the current-task cursor into a
//! single value. The hardware port keeps one instance in a `KernelCell`
//! static and reaches it only through `KernelCell::with`, i.e. inside a
//! critical section.
//!
//! Lifecycle: `add_threads` → `bootstrap` (once) → `switch` on every tick.
//!
//! Author: Moroya Sakamoto

use core::cell::RefCell;

use critical_section::Mutex;
use log::{debug, error, info};

use crate::config::{MAX_TASKS, STACK_WORDS};
use crate::context::TaskStack;
use crate::error::KernelError;
use crate::scheduler::TcbRing;
use crate::task::{TaskFn, TaskState};
use crate::timer::{TickConfig, TickSource};

/// Kernel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No tasks registered yet
    Empty,
    /// Tasks registered, scheduler not started
    Registered,
    /// Task 0 has been started; ticks drive the ring
    Launched,
}

/// Round-robin kernel with `N` task slots of `W` stack words each
///
/// Saved stack tops are absolute addresses into `stacks`, so a kernel must
/// stay where it is once tasks are registered (in practice: a static).
///
/// Memory footprint with the defaults: 4 × 400 B stacks + 4 TCBs + a few
/// words of bookkeeping, all static.
pub struct Kernel<const N: usize = MAX_TASKS, const W: usize = STACK_WORDS> {
    /// One stack per task slot
    stacks: [TaskStack<W>; N],
    /// Scheduling order and saved stack tops
    ring: TcbRing<N>,
    /// Registered entry points
    entries: [Option<TaskFn>; N],
    /// Core clock used for the tick reload
    clock_hz: u32,
    phase: Phase,
    /// Completed context switches
    context_switches: u32,
}

impl<const N: usize, const W: usize> Kernel<N, W> {
    /// Create an empty kernel for a core running at `clock_hz`
    pub const fn new(clock_hz: u32) -> Self {
        Self {
            stacks: [const { TaskStack::new() }; N],
            ring: TcbRing::new(),
            entries: [None; N],
            clock_hz,
            phase: Phase::Empty,
            context_switches: 0,
        }
    }

    /// Register the task set, in scheduling order.
    ///
    /// Builds a synthetic context on each task's stack, links the ring and
    /// points the cursor at task 0. Runs with interrupts masked. Calling it
    /// again before launch replaces the whole set.
    pub fn add_threads(&mut self, entries: &[TaskFn]) -> Result<usize, KernelError> {
        critical_section::with(|_| self.register(entries))
    }

    fn register(&mut self, entries: &[TaskFn]) -> Result<usize, KernelError> {
        if self.phase == Phase::Launched {
            return Err(KernelError::AlreadyLaunched);
        }
        if entries.is_empty() {
            return Err(KernelError::NoTasks);
        }
        if entries.len() > N {
            return Err(KernelError::CapacityExceeded {
                requested: entries.len(),
                capacity: N,
            });
        }

        let mut tops = [0usize; N];
        for (idx, &entry) in entries.iter().enumerate() {
            tops[idx] = self.stacks[idx].init_context(entry);
            self.entries[idx] = Some(entry);
            debug!("task {} context at {:#010x}", idx, tops[idx]);
        }
        for slot in &mut self.entries[entries.len()..] {
            *slot = None;
        }
        self.ring.build(&tops[..entries.len()])?;
        self.phase = Phase::Registered;

        info!("registered {} of {} tasks", entries.len(), N);
        Ok(entries.len())
    }

    /// Reset one registered task to its never-run state with a new entry.
    pub fn init_task(&mut self, task: usize, entry: TaskFn) -> Result<(), KernelError> {
        critical_section::with(|_| {
            if self.phase == Phase::Launched {
                return Err(KernelError::AlreadyLaunched);
            }
            if task >= self.ring.len() {
                return Err(KernelError::InvalidTask {
                    task,
                    count: self.ring.len(),
                });
            }
            let top = self.stacks[task].init_context(entry);
            self.ring.set_stack_top(task, top);
            self.entries[task] = Some(entry);
            debug!("task {} re-initialized", task);
            Ok(())
        })
    }

    /// Arm the tick and hand back the stack top of task 0.
    ///
    /// The caller performs the restore-only half of a switch from that
    /// stack top; from then on the kernel counts as launched.
    pub fn bootstrap<T: TickSource>(
        &mut self,
        timer: &mut T,
        period_us: u32,
    ) -> Result<usize, KernelError> {
        match self.phase {
            Phase::Launched => return Err(KernelError::AlreadyLaunched),
            Phase::Empty => return Err(KernelError::NotRegistered),
            Phase::Registered => {}
        }
        self.check_stacks()?;

        let config = TickConfig::new(self.clock_hz, period_us)?;
        timer.arm(&config);
        debug!(
            "tick armed: reload {} priority {:#04x}",
            config.reload(),
            config.priority()
        );

        self.phase = Phase::Launched;
        let sp = self.ring.current_tcb().stack_top();
        info!(
            "launching task {} of {}, {} us slices",
            self.ring.current(),
            self.ring.len(),
            period_us
        );
        Ok(sp)
    }

    /// Save `sp` for the running task and return the next task's stack top.
    ///
    /// Body of the tick handler between the software-frame push and pop.
    /// Constant time: one guard check, one store, one index step, one load.
    /// Before launch the tick is ignored and `sp` comes straight back.
    pub fn switch(&mut self, sp: usize) -> usize {
        if self.phase != Phase::Launched {
            return sp;
        }
        let outgoing = self.ring.current();
        if !self.stacks[outgoing].guard_intact() {
            error!("stack guard of task {} overwritten", outgoing);
            panic!("{}", KernelError::StackOverflow { task: outgoing });
        }
        self.context_switches = self.context_switches.wrapping_add(1);
        self.ring.rotate(sp)
    }

    /// Verify the guard word of every registered stack.
    pub fn check_stacks(&self) -> Result<(), KernelError> {
        match (0..self.ring.len()).find(|&task| !self.stacks[task].guard_intact()) {
            Some(task) => Err(KernelError::StackOverflow { task }),
            None => Ok(()),
        }
    }

    /// Index of the running (or first-to-run) task
    pub fn current(&self) -> usize {
        self.ring.current()
    }

    /// Saved stack top of a task. Only meaningful for suspended tasks.
    pub fn saved_stack_top(&self, task: usize) -> Option<usize> {
        self.ring.get(task).map(|tcb| tcb.stack_top())
    }

    pub fn task_state(&self, task: usize) -> Option<TaskState> {
        self.ring.get(task)?;
        if self.phase == Phase::Launched && task == self.ring.current() {
            Some(TaskState::Running)
        } else {
            Some(TaskState::Suspended)
        }
    }

    /// Registered entry point of a task
    pub fn entry(&self, task: usize) -> Option<TaskFn> {
        self.entries.get(task).copied().flatten()
    }

    /// Stack of a task slot
    pub fn stack(&self, task: usize) -> Option<&TaskStack<W>> {
        self.stacks.get(task)
    }

    pub fn ring(&self) -> &TcbRing<N> {
        &self.ring
    }

    pub fn task_count(&self) -> usize {
        self.ring.len()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_launched(&self) -> bool {
        self.phase == Phase::Launched
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Context switches since launch (wraps)
    pub fn context_switches(&self) -> u32 {
        self.context_switches
    }

    /// Memory footprint estimate
    pub fn memory_footprint(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

/// Process-wide home of the kernel
///
/// Every access runs inside a critical section, which is the only mutual
/// exclusion in the system.
pub struct KernelCell<const N: usize = MAX_TASKS, const W: usize = STACK_WORDS> {
    inner: Mutex<RefCell<Kernel<N, W>>>,
}

impl<const N: usize, const W: usize> KernelCell<N, W> {
    pub const fn new(kernel: Kernel<N, W>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(kernel)),
        }
    }

    /// Run `f` on the kernel with interrupts masked.
    ///
    /// Panics if called again from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Kernel<N, W>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
