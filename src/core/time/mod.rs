//! Time management: tick-driven delays and the tick handler itself
//!
//! Wake times are absolute ticks stored in the state item's sort key.
//! A wake time that wraps past [`TICK_MAX`] goes on the overflow list;
//! the two delay lists trade places when the counter wraps, which keeps
//! every comparison an unsigned `<` with no modular arithmetic.

use core::ptr::NonNull;

use crate::config::CFG_USE_TIME_SLICING;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{self, SchedState, KERNEL, SCHED};
use crate::list::List;
use crate::sched;
use crate::types::{OsTick, TICK_MAX};

/// Block the calling task for at least `ticks` ticks.
///
/// The wake-up is no earlier than requested and may be later if
/// higher-priority work holds the core. A zero delay degenerates to a
/// yield.
///
/// # Returns
/// * `Err(OsError::OsNotRunning)` - scheduler not started
/// * `Err(OsError::TimeDlyIsr)` - called from ISR context
/// * `Err(OsError::SchedLocked)` - the caller holds the scheduler lock
pub fn os_time_delay(ticks: OsTick) -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }
    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }
    if KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    if ticks == 0 {
        sched::os_task_yield();
        return Ok(());
    }

    critical_section(|cs| {
        let sched_state = SCHED.get(cs);
        if let Some(cur) = kernel::tcb_cur_ptr() {
            let now = KERNEL.tick_get();
            let wake = now.wrapping_add(ticks);
            unsafe { delay_current_until(sched_state, cur.as_ptr(), now, wake) };
        }
    });

    sched::os_task_yield();
    Ok(())
}

/// Block until an absolute wake time on a fixed period.
///
/// `prev_wake` carries the previous wake time across calls, so the
/// period stays drift-free regardless of how long the task ran. Returns
/// whether the task actually blocked; `false` means the deadline had
/// already passed.
pub fn os_time_delay_until(prev_wake: &mut OsTick, increment: OsTick) -> OsResult<bool> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }
    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }
    if KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    let should_delay = critical_section(|cs| {
        let sched_state = SCHED.get(cs);
        let now = KERNEL.tick_get();
        let wake = prev_wake.wrapping_add(increment);

        // The deadline only counts as future if it lands in the open
        // interval between the last wake and now, accounting for the
        // counter having wrapped since `prev_wake` was captured.
        let should_delay = if now < *prev_wake {
            wake < *prev_wake && wake > now
        } else {
            wake < *prev_wake || wake > now
        };
        *prev_wake = wake;

        if should_delay {
            if let Some(cur) = kernel::tcb_cur_ptr() {
                unsafe { delay_current_until(sched_state, cur.as_ptr(), now, wake) };
            }
        }
        should_delay
    });

    if should_delay {
        sched::os_task_yield();
    }
    Ok(should_delay)
}

/// Park the running task on the delay list that matches its wake time.
///
/// # Safety
/// Caller holds a critical section; `cur` is the running task and is
/// currently on its ready list.
unsafe fn delay_current_until(
    sched_state: &mut SchedState,
    cur: *mut crate::task::OsTcb,
    now: OsTick,
    wake: OsTick,
) {
    unsafe {
        let tcb = &mut *cur;

        sched::rdy_list_remove(sched_state, NonNull::new_unchecked(cur));

        tcb.state_item.set_value(wake);

        if wake < now {
            // Wake time wrapped: parked until the lists swap. The swap
            // recomputes the deadline, so it is left alone here.
            sched_state
                .overflow_delay_list()
                .insert(NonNull::from(&mut tcb.state_item));
        } else {
            sched_state
                .delay_list()
                .insert(NonNull::from(&mut tcb.state_item));
            if wake < sched_state.next_unblock {
                sched_state.next_unblock = wake;
            }
        }
    }
}

/// Current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    KERNEL.tick_get()
}

/// Overwrite the tick counter (diagnostics; does not reschedule
/// anything already delayed).
#[inline]
pub fn os_time_set(tick: OsTick) {
    KERNEL.tick_set(tick);
}

/// Advance kernel time by one tick and wake everything that is due.
///
/// Runs in the tick exception with the ISR mask raised by the caller.
/// Returns whether a context switch should be pended: a woken task
/// outranks (or ties) the running one, or time slicing has peers
/// waiting at the running task's priority.
pub fn os_tick_increment() -> bool {
    if !KERNEL.is_running() {
        return false;
    }

    let mut switch_needed = false;

    unsafe {
        let sched_state = SCHED.get_unchecked();
        let now = KERNEL.tick_advance();

        if now == 0 {
            // Counter wrapped. Nothing awaiting a pre-wrap tick can
            // still be on the active list, which is exactly what makes
            // the swap sound.
            crate::os_assert!(sched_state.delay_list().is_empty());
            sched_state.swap_delay_lists();
        }

        while now >= sched_state.next_unblock {
            if sched_state.delay_list().is_empty() {
                sched_state.next_unblock = TICK_MAX;
                break;
            }

            let head = match sched_state.delay_list().head() {
                Some(head) => head,
                None => break,
            };
            let wake = sched_state.delay_list().head_value();
            if now < wake {
                sched_state.next_unblock = wake;
                break;
            }

            let owner = (*head.as_ptr()).owner();
            List::remove(head);
            sched::rdy_list_insert(sched_state, NonNull::new_unchecked(owner));

            if let Some(cur) = kernel::tcb_cur_ptr() {
                if (*owner).prio >= cur.as_ref().prio {
                    switch_needed = true;
                }
            }
        }

        if CFG_USE_TIME_SLICING {
            if let Some(cur) = kernel::tcb_cur_ptr() {
                if sched_state.rdy_list[cur.as_ref().prio as usize].len() > 1 {
                    switch_needed = true;
                }
            }
        }
    }

    switch_needed
}
