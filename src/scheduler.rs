//! Round-robin scheduler — fixed ring of task control blocks
//!
//! Scheduling order is ring order. Picking the next task is a single
//! index load: no scanning, no priorities, no starvation.
//! The ring is built once and its topology never changes afterwards.
//!
//! Author: Moroya Sakamoto

use crate::error::KernelError;
use crate::task::Tcb;

/// Closed ring of TCBs over a static array
///
/// `tcbs[i].next == (i + 1) % len` for every registered slot.
/// Size: N × 2 words + 2 words
pub struct TcbRing<const N: usize> {
    /// Static TCB table
    tcbs: [Tcb; N],
    /// Registered tasks (ring length)
    len: usize,
    /// Current-task cursor
    current: usize,
}

impl<const N: usize> TcbRing<N> {
    /// Empty ring
    pub const fn new() -> Self {
        Self {
            tcbs: [Tcb::empty(); N],
            len: 0,
            current: 0,
        }
    }

    /// Link one TCB per initialized context into a closed ring.
    ///
    /// The cursor starts at task 0. Rebuilding replaces the previous ring.
    pub fn build(&mut self, stack_tops: &[usize]) -> Result<(), KernelError> {
        let len = stack_tops.len();
        if len == 0 {
            return Err(KernelError::NoTasks);
        }
        if len > N {
            return Err(KernelError::CapacityExceeded { requested: len, capacity: N });
        }

        for (i, &top) in stack_tops.iter().enumerate() {
            self.tcbs[i] = Tcb {
                stack_top: top,
                next: (i + 1) % len,
            };
        }
        for tcb in &mut self.tcbs[len..] {
            *tcb = Tcb::empty();
        }
        self.len = len;
        self.current = 0;
        Ok(())
    }

    /// Number of tasks in the ring
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ring capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Index of the running task
    pub fn current(&self) -> usize {
        self.current
    }

    /// TCB of the running task
    pub fn current_tcb(&self) -> &Tcb {
        &self.tcbs[self.current]
    }

    /// Get TCB by index
    pub fn get(&self, idx: usize) -> Option<&Tcb> {
        if idx < self.len {
            Some(&self.tcbs[idx])
        } else {
            None
        }
    }

    /// Overwrite the saved stack top of one task (pre-launch re-init).
    pub(crate) fn set_stack_top(&mut self, idx: usize, top: usize) {
        if idx < self.len {
            self.tcbs[idx].stack_top = top;
        }
    }

    /// One round-robin step.
    ///
    /// Records `sp` as the outgoing task's stack top, moves the cursor to
    /// its successor and returns the successor's saved stack top.
    /// An empty ring hands `sp` straight back.
    pub(crate) fn rotate(&mut self, sp: usize) -> usize {
        if self.len == 0 {
            return sp;
        }
        let outgoing = &mut self.tcbs[self.current];
        outgoing.stack_top = sp;
        self.current = outgoing.next;
        self.tcbs[self.current].stack_top
    }

    /// Task indices in the order they will run, starting with the current one.
    pub fn order(&self) -> RingIter<'_, N> {
        RingIter {
            ring: self,
            at: self.current,
            remaining: self.len,
        }
    }
}

impl<const N: usize> Default for TcbRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks `next` links once around the ring
pub struct RingIter<'a, const N: usize> {
    ring: &'a TcbRing<N>,
    at: usize,
    remaining: usize,
}

impl<const N: usize> Iterator for RingIter<'_, N> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let idx = self.at;
        self.at = self.ring.tcbs[idx].next;
        self.remaining -= 1;
        Some(idx)
    }
}
