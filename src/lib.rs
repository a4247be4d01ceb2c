//! kestrel — a small preemptive RTOS kernel for ARM Cortex-M3
//!
//! A real-time kernel core providing:
//! - Fixed-priority preemptive scheduling with round-robin among equals
//! - Tick-driven delays with wraparound-safe dual delay lists
//! - Context switching over the PendSV/SVCall exception pair
//! - BASEPRI-based critical sections that never block urgent interrupts
//!
//! All storage is caller-provided; the kernel allocates nothing.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod port;

// ============ Re-exports ============

pub use core::config;
pub use core::config::*;
pub use core::critical;
pub use core::critical::{
    critical_section, os_enter_critical, os_enter_critical_from_isr, os_exit_critical,
    os_exit_critical_from_isr, CriticalSection,
};
pub use core::error;
pub use core::error::{OsError, OsResult};
pub use core::kernel;
pub use core::kernel::{
    os_init, os_sched_lock, os_sched_unlock, os_start, os_task_current,
};
pub use core::list;
pub use core::list::{List, ListItem};
pub use core::prio;
pub use core::prio::PrioMask;
pub use core::sched;
pub use core::sched::{os_task_switch_context, os_task_yield};
pub use core::task;
pub use core::task::{os_task_create, OsTaskFn, OsTcb, TaskHandle};
pub use core::time;
pub use core::time::{
    os_tick_increment, os_time_delay, os_time_delay_until, os_time_get, os_time_set,
};
pub use core::types;
pub use core::types::*;

// ============ Test support ============

/// Serializes host tests that drive the process-wide kernel state.
#[cfg(test)]
pub(crate) mod test_lock {
    use std::sync::{Mutex, MutexGuard};

    static LOCK: Mutex<()> = Mutex::new(());

    pub fn lock() -> MutexGuard<'static, ()> {
        // A poisoned lock only means another test failed; the state is
        // rebuilt by os_init anyway.
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
