//! Task management: static creation and the lifecycle hooks the
//! scheduler builds on
//!
//! All storage is caller-provided; the kernel never allocates and never
//! frees a stack or a TCB.

mod tcb;

pub use tcb::OsTcb;

use core::ptr::NonNull;

use crate::config::{CFG_MAX_PRIORITIES, CFG_STK_SIZE_MIN, CFG_USE_PREEMPTION};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel::{self, KERNEL, SCHED};
use crate::sched;
use crate::types::{OsPrio, OsStkElement};

/// Task entry point. Tasks normally never return; one that does lands
/// in the port's exit trampoline.
pub type OsTaskFn = extern "C" fn(arg: *mut ());

/// Opaque handle to a created task
pub type TaskHandle = NonNull<OsTcb>;

/// Create a task from caller-provided storage.
///
/// The priority is clamped to the highest configured level. Safe to
/// call before the scheduler starts; the first creation also wires up
/// the scheduler tables.
///
/// # Example
/// ```ignore
/// static mut TASK_TCB: OsTcb = OsTcb::new();
/// static mut TASK_STK: [OsStkElement; 256] = [0; 256];
///
/// extern "C" fn blink(_: *mut ()) {
///     loop { /* ... */ }
/// }
///
/// // In main:
/// let handle = os_task_create(
///     blink,
///     "blink",
///     core::ptr::null_mut(),
///     3,
///     unsafe { &mut *(&raw mut TASK_STK) },
///     unsafe { &mut *(&raw mut TASK_TCB) },
/// )
/// .expect("task creation failed");
/// ```
pub fn os_task_create(
    entry: OsTaskFn,
    name: &str,
    arg: *mut (),
    prio: OsPrio,
    stack: &'static mut [OsStkElement],
    tcb: &'static mut OsTcb,
) -> OsResult<TaskHandle> {
    unsafe {
        os_task_create_raw(
            tcb as *mut OsTcb,
            name,
            entry,
            arg,
            prio,
            stack.as_mut_ptr(),
            stack.len(),
        )
    }
}

/// Pointer-level task creation shared by the public API and the kernel
/// (idle task).
///
/// # Safety
/// `tcb` and `stk_base..stk_base+stk_depth` must point at storage that
/// stays valid for the life of the task and is not aliased by anyone
/// else.
pub(crate) unsafe fn os_task_create_raw(
    tcb: *mut OsTcb,
    name: &str,
    entry: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_depth: usize,
) -> OsResult<TaskHandle> {
    if tcb.is_null() {
        return Err(OsError::TcbInvalid);
    }
    if stk_base.is_null() {
        return Err(OsError::StkInvalid);
    }
    if stk_depth < CFG_STK_SIZE_MIN {
        return Err(OsError::StkSizeInvalid);
    }
    if is_isr_context() {
        return Err(OsError::TaskCreateIsr);
    }

    let prio = if (prio as usize) >= CFG_MAX_PRIORITIES {
        (CFG_MAX_PRIORITIES - 1) as OsPrio
    } else {
        prio
    };

    let tcb_ref = unsafe { &mut *tcb };
    tcb_ref.init();
    tcb_ref.set_name(name);

    // Top of stack: last word of the buffer, pulled down to an 8-byte
    // boundary per AAPCS. The port lays the initial exception frame
    // below it.
    let stk_top = unsafe { stk_base.add(stk_depth - 1) };
    let stk_top = (stk_top as usize & !0x7) as *mut OsStkElement;
    tcb_ref.stk_ptr = unsafe { crate::port::os_task_stk_init(stk_top, entry, arg) };
    tcb_ref.stk_base = stk_base;
    tcb_ref.prio = prio;

    tcb_ref.state_item.init();
    tcb_ref.state_item.set_owner(tcb);
    tcb_ref.event_item.init();
    tcb_ref.event_item.set_owner(tcb);

    let handle = unsafe { NonNull::new_unchecked(tcb) };

    critical_section(|cs| {
        let sched_state = SCHED.get(cs);

        if KERNEL.task_count_inc() == 1 {
            sched_state.init_lists();
        }

        // Before launch the current-task slot tracks the best candidate
        // so far; the launch runs it verbatim.
        match kernel::tcb_cur_ptr() {
            None => kernel::set_tcb_cur(tcb),
            Some(cur) => {
                if !KERNEL.is_running() && prio >= unsafe { cur.as_ref().prio } {
                    kernel::set_tcb_cur(tcb);
                }
            }
        }

        unsafe {
            sched_state.rdy_list[prio as usize]
                .insert_end(NonNull::from(&mut tcb_ref.state_item));
        }
        sched_state.prio_mask.insert(prio);
    });

    crate::debug!("task '{}' created at prio {}", tcb_ref.name(), prio);

    // A better-priority arrival preempts a running system right away.
    if CFG_USE_PREEMPTION && KERNEL.is_running() {
        if let Some(cur) = kernel::tcb_cur_ptr() {
            if prio > unsafe { cur.as_ref().prio } {
                sched::os_task_yield();
            }
        }
    }

    Ok(handle)
}

#[cfg(test)]
pub(crate) extern "C" fn tests_entry(_: *mut ()) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::os_init;
    use crate::test_lock;
    use core::ptr;

    #[test]
    fn creation_rejects_bad_buffers() {
        let _guard = test_lock::lock();
        os_init().unwrap();
        crate::critical::reset_critical_nesting();

        static mut STK: [OsStkElement; 64] = [0; 64];
        static mut TCB: OsTcb = OsTcb::new();
        unsafe {
            assert_eq!(
                os_task_create_raw(
                    ptr::null_mut(),
                    "t",
                    tests_entry,
                    ptr::null_mut(),
                    1,
                    (&raw mut STK).cast(),
                    64,
                ),
                Err(OsError::TcbInvalid)
            );
            assert_eq!(
                os_task_create_raw(
                    &raw mut TCB,
                    "t",
                    tests_entry,
                    ptr::null_mut(),
                    1,
                    ptr::null_mut(),
                    64,
                ),
                Err(OsError::StkInvalid)
            );
            assert_eq!(
                os_task_create_raw(
                    &raw mut TCB,
                    "t",
                    tests_entry,
                    ptr::null_mut(),
                    1,
                    (&raw mut STK).cast(),
                    CFG_STK_SIZE_MIN - 1,
                ),
                Err(OsError::StkSizeInvalid)
            );
        }
        // Failed creations leave no trace.
        assert_eq!(KERNEL.task_count(), 0);
    }

    #[test]
    fn priority_clamps_to_top_level() {
        let _guard = test_lock::lock();
        os_init().unwrap();
        crate::critical::reset_critical_nesting();

        static mut STK: [OsStkElement; 64] = [0; 64];
        static mut TCB: OsTcb = OsTcb::new();
        let handle = unsafe {
            os_task_create_raw(
                &raw mut TCB,
                "hog",
                tests_entry,
                ptr::null_mut(),
                200,
                (&raw mut STK).cast(),
                64,
            )
            .unwrap()
        };
        assert_eq!(
            unsafe { handle.as_ref().prio },
            (CFG_MAX_PRIORITIES - 1) as OsPrio
        );
    }

    #[test]
    fn highest_priority_creation_wins_the_launch_slot() {
        let _guard = test_lock::lock();
        os_init().unwrap();
        crate::critical::reset_critical_nesting();

        static mut STK_A: [OsStkElement; 64] = [0; 64];
        static mut TCB_A: OsTcb = OsTcb::new();
        static mut STK_B: [OsStkElement; 64] = [0; 64];
        static mut TCB_B: OsTcb = OsTcb::new();

        let a = unsafe {
            os_task_create_raw(
                &raw mut TCB_A,
                "a",
                tests_entry,
                ptr::null_mut(),
                1,
                (&raw mut STK_A).cast(),
                64,
            )
            .unwrap()
        };
        assert_eq!(kernel::os_task_current(), Some(a));

        let b = unsafe {
            os_task_create_raw(
                &raw mut TCB_B,
                "b",
                tests_entry,
                ptr::null_mut(),
                3,
                (&raw mut STK_B).cast(),
                64,
            )
            .unwrap()
        };
        // The most urgent creation, not the most recent, holds the slot.
        assert_eq!(kernel::os_task_current(), Some(b));

        crate::kernel::os_start().unwrap();
        assert_eq!(kernel::os_task_current(), Some(b));

        KERNEL.set_running(false);
    }

    #[test]
    fn tcb_lands_in_its_priority_ready_list() {
        let _guard = test_lock::lock();
        os_init().unwrap();
        crate::critical::reset_critical_nesting();

        static mut STK: [OsStkElement; 64] = [0; 64];
        static mut TCB: OsTcb = OsTcb::new();
        unsafe {
            os_task_create_raw(
                &raw mut TCB,
                "t",
                tests_entry,
                ptr::null_mut(),
                2,
                (&raw mut STK).cast(),
                64,
            )
            .unwrap();
            let sched_state = SCHED.get_unchecked();
            assert_eq!(sched_state.rdy_list[2].len(), 1);
            assert!(sched_state.prio_mask.is_set(2));
            assert!((*(&raw mut TCB)).state_item.is_linked());
        }
    }
}
