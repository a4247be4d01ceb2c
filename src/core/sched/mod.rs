//! Scheduler: priority selection and ready-list maintenance
//!
//! Selection runs inside the context-switch exception with the mask
//! raised. It picks the highest non-empty priority and walks that
//! list's cursor one step; equal-priority tasks therefore take turns
//! without any quantum bookkeeping.

use core::ptr::NonNull;

use crate::kernel::{self, SchedState, KERNEL, SCHED};
use crate::list::List;
use crate::task::OsTcb;

/// Pend a context switch. The switch itself happens when the pended
/// exception runs, after all device interrupts drain.
#[inline(always)]
pub fn os_task_yield() {
    crate::port::os_ctx_sw();
}

/// Move the current-task slot to the next task to run.
///
/// Called from the context-switch exception (interrupts masked by the
/// handler). With the scheduler locked the slot is left alone; the
/// unlock path re-issues the switch.
#[no_mangle]
pub extern "C" fn os_task_switch_context() {
    if KERNEL.sched_lock_nesting() > 0 {
        return;
    }

    unsafe {
        let sched = SCHED.get_unchecked();
        let prio = sched.prio_mask.highest();
        debug_assert!(!sched.rdy_list[prio as usize].is_empty());
        let owner = sched.rdy_list[prio as usize].owner_of_next_entry();
        kernel::set_tcb_cur(owner);
    }
}

/// Put a task back on the ready list for its priority.
///
/// # Safety
/// Caller holds a critical section (or runs in the tick exception) and
/// the task's state item is detached.
pub(crate) unsafe fn rdy_list_insert(sched_state: &mut SchedState, tcb: NonNull<OsTcb>) {
    unsafe {
        let tcb_ref = &mut *tcb.as_ptr();
        let prio = tcb_ref.prio;
        sched_state.rdy_list[prio as usize].insert_end(NonNull::from(&mut tcb_ref.state_item));
        sched_state.prio_mask.insert(prio);
    }
}

/// Take a task off its ready list, clearing the priority bit when the
/// list drains.
///
/// # Safety
/// Caller holds a critical section and the task is currently ready.
pub(crate) unsafe fn rdy_list_remove(sched_state: &mut SchedState, tcb: NonNull<OsTcb>) {
    unsafe {
        let tcb_ref = &mut *tcb.as_ptr();
        let prio = tcb_ref.prio;
        if List::remove(NonNull::from(&mut tcb_ref.state_item)) == 0 {
            sched_state.prio_mask.remove(prio);
        }
    }
}
