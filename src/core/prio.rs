//! Ready-priority bitmap for O(1) highest-priority lookup
//!
//! One bit per priority level; bit `p` stays set exactly while the ready
//! list for priority `p` holds at least one task. Selection either takes
//! a count-leading-zeros over the word or scans downward from the top
//! configured level, depending on configuration.

use crate::config::{CFG_MAX_PRIORITIES, CFG_USE_PORT_OPTIMISED_TASK_SELECTION};
use crate::types::OsPrio;

/// Bitmap of priorities that currently have ready tasks
pub struct PrioMask {
    bits: u32,
}

impl PrioMask {
    pub const fn new() -> Self {
        PrioMask { bits: 0 }
    }

    pub fn init(&mut self) {
        self.bits = 0;
    }

    /// Mark priority `prio` as having ready work
    #[inline]
    pub fn insert(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_MAX_PRIORITIES);
        self.bits |= 1 << prio;
    }

    /// Clear priority `prio`; called when its ready list drains
    #[inline]
    pub fn remove(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_MAX_PRIORITIES);
        self.bits &= !(1 << prio);
    }

    /// Highest priority with a ready task.
    ///
    /// While the scheduler runs the idle task keeps bit 0 set, so the
    /// answer is always a live priority.
    #[inline]
    pub fn highest(&self) -> OsPrio {
        if CFG_USE_PORT_OPTIMISED_TASK_SELECTION {
            if self.bits == 0 {
                return 0;
            }
            (31 - self.bits.leading_zeros()) as OsPrio
        } else {
            let mut prio = CFG_MAX_PRIORITIES - 1;
            while prio > 0 && self.bits & (1u32 << prio) == 0 {
                prio -= 1;
            }
            prio as OsPrio
        }
    }

    #[inline]
    pub fn is_set(&self, prio: OsPrio) -> bool {
        self.bits & (1 << prio) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl Default for PrioMask {
    fn default() -> Self {
        Self::new()
    }
}
