//! Global kernel state: tick counter, scheduler tables, the running
//! task, and the start/init entry points
//!
//! Everything here is process-wide and single-core. Mutation happens
//! either under a BASEPRI critical section or inside the context-switch
//! exception, never concurrently; atomics carry the cross-context reads
//! with relaxed ordering.

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::config::{CFG_MAX_PRIORITIES, CFG_MINIMAL_STACK_SIZE, CFG_PRIO_IDLE};
use crate::core::cs_cell::CsCell;
use crate::critical::{self, critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::list::List;
use crate::prio::PrioMask;
use crate::task::{self, OsTcb, TaskHandle};
use crate::types::{OsNestingCtr, OsStkElement, OsTick, OsTickAtomic, TICK_MAX};
use crate::port;

// ============ Kernel flags ============

/// Atomic kernel flags and counters
pub struct KernelFlags {
    running: AtomicBool,
    tick_counter: OsTickAtomic,
    task_count: AtomicUsize,
    overflow_count: AtomicU32,
    sched_lock_nesting: AtomicU8,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            tick_counter: OsTickAtomic::new(0),
            task_count: AtomicUsize::new(0),
            overflow_count: AtomicU32::new(0),
            sched_lock_nesting: AtomicU8::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
        self.task_count.store(0, Ordering::SeqCst);
        self.overflow_count.store(0, Ordering::SeqCst);
        self.sched_lock_nesting.store(0, Ordering::SeqCst);
    }

    /// Check if the scheduler has been started
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    /// Current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn tick_set(&self, tick: OsTick) {
        self.tick_counter.store(tick, Ordering::Relaxed);
    }

    /// Advance the tick counter by one, wrapping freely; returns the
    /// new value.
    #[inline(always)]
    pub(crate) fn tick_advance(&self) -> OsTick {
        self.tick_counter
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    /// Number of tasks ever created since init
    #[inline(always)]
    pub fn task_count(&self) -> usize {
        self.task_count.load(Ordering::Relaxed)
    }

    /// Bump the task count; returns the new value.
    #[inline(always)]
    pub(crate) fn task_count_inc(&self) -> usize {
        self.task_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// How many times the delay lists have swapped on tick wrap
    #[inline(always)]
    pub fn overflow_count(&self) -> u32 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn overflow_count_inc(&self) {
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Scheduler lock nesting level
    #[inline(always)]
    pub fn sched_lock_nesting(&self) -> OsNestingCtr {
        self.sched_lock_nesting.load(Ordering::SeqCst)
    }

    pub(crate) fn try_sched_lock(&self) -> OsResult<()> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == OsNestingCtr::MAX {
            return Err(OsError::LockNestingOvf);
        }
        self.sched_lock_nesting.store(nesting + 1, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn try_sched_unlock(&self) -> OsResult<OsNestingCtr> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == 0 {
            return Err(OsError::SchedNotLocked);
        }
        self.sched_lock_nesting.store(nesting - 1, Ordering::SeqCst);
        Ok(nesting - 1)
    }
}

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

// ============ Scheduler state ============

/// Scheduler tables: one ready list per priority, the two alternating
/// delay lists, the ready bitmap and the next wake deadline.
pub struct SchedState {
    pub(crate) rdy_list: [List; CFG_MAX_PRIORITIES],
    /// Two lists; `active_delay` names the one holding non-wrapped
    /// wake times, the other collects wake times past the counter wrap.
    pub(crate) delay_lists: [List; 2],
    pub(crate) active_delay: usize,
    pub(crate) prio_mask: PrioMask,
    /// Smallest wake time in the active delay list, or [`TICK_MAX`]
    /// when it is empty
    pub(crate) next_unblock: OsTick,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            rdy_list: [const { List::new() }; CFG_MAX_PRIORITIES],
            delay_lists: [const { List::new() }; 2],
            active_delay: 0,
            prio_mask: PrioMask::new(),
            next_unblock: TICK_MAX,
        }
    }

    /// Wire up every list; runs when the first task is created and on
    /// kernel re-initialization.
    pub(crate) fn init_lists(&mut self) {
        for list in self.rdy_list.iter_mut() {
            list.init();
        }
        for list in self.delay_lists.iter_mut() {
            list.init();
        }
        self.active_delay = 0;
        self.prio_mask.init();
        self.next_unblock = TICK_MAX;
    }

    /// Delay list holding wake times that have not wrapped
    #[inline]
    pub(crate) fn delay_list(&mut self) -> &mut List {
        &mut self.delay_lists[self.active_delay]
    }

    /// Delay list collecting wake times past the counter wrap
    #[inline]
    pub(crate) fn overflow_delay_list(&mut self) -> &mut List {
        &mut self.delay_lists[self.active_delay ^ 1]
    }

    /// Swap the delay lists at tick wrap and refresh the wake deadline
    /// from the new head.
    pub(crate) fn swap_delay_lists(&mut self) {
        self.active_delay ^= 1;
        KERNEL.overflow_count_inc();
        self.refresh_next_unblock();
    }

    /// Recompute `next_unblock` from the active list head
    pub(crate) fn refresh_next_unblock(&mut self) {
        let list = &self.delay_lists[self.active_delay];
        self.next_unblock = if list.is_empty() {
            TICK_MAX
        } else {
            list.head_value()
        };
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

// ============ Running task ============

/// TCB of the running task; null until the scheduler launches.
///
/// The context-switch and launch exception handlers reach the task
/// stack through this symbol, so it keeps a stable unmangled name.
#[no_mangle]
#[used]
pub static mut CURRENT_TCB: *mut OsTcb = ptr::null_mut();

/// Current TCB as an option
#[inline]
pub(crate) fn tcb_cur_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { NonNull::new(CURRENT_TCB) }
}

#[inline]
pub(crate) fn set_tcb_cur(tcb: *mut OsTcb) {
    unsafe {
        CURRENT_TCB = tcb;
    }
}

/// Handle of the running task, or `None` before launch
#[inline]
pub fn os_task_current() -> Option<TaskHandle> {
    tcb_cur_ptr()
}

// ============ Idle task ============

static mut IDLE_TCB: OsTcb = OsTcb::new();
static mut IDLE_STK: [OsStkElement; CFG_MINIMAL_STACK_SIZE] = [0; CFG_MINIMAL_STACK_SIZE];

/// Idle body: priority 0 is never allowed to drain, so selection always
/// finds a task.
extern "C" fn os_idle_task(_: *mut ()) {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::nop();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

// ============ Public API ============

/// Reset the kernel to its power-on state.
///
/// Optional on the target (creating the first task performs the same
/// lazy initialization); host tests call it between scenarios.
///
/// # Returns
/// * `Err(OsError::OsRunning)` - the scheduler has already launched
pub fn os_init() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    KERNEL.reset();
    set_tcb_cur(ptr::null_mut());
    unsafe {
        SCHED.get_unchecked().init_lists();
    }
    critical::rearm_critical_nesting();

    Ok(())
}

/// Start multitasking. Creates the idle task, then hands the core to
/// the highest-priority ready task; does not return on the target.
///
/// # Returns
/// * `Err(OsError::OsRunning)` - the scheduler has already launched
pub fn os_start() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    unsafe {
        task::os_task_create_raw(
            &raw mut IDLE_TCB,
            "IDLE",
            os_idle_task,
            ptr::null_mut(),
            CFG_PRIO_IDLE,
            (&raw mut IDLE_STK).cast::<OsStkElement>(),
            CFG_MINIMAL_STACK_SIZE,
        )?;
    }

    // Interrupts stay masked from here until the first task clears
    // BASEPRI on its way out of the launch exception.
    port::raise_basepri();

    KERNEL.tick_set(0);
    unsafe {
        SCHED.get_unchecked().next_unblock = TICK_MAX;
    }
    KERNEL.set_running(true);

    crate::info!("scheduler start: {} tasks", KERNEL.task_count());

    unsafe { port::os_port_start_scheduler() };

    // Only the host port stub ever comes back here.
    Ok(())
}

/// Lock the scheduler: the running task keeps the core across ticks
/// until the matching unlock. Delays keep expiring into the ready
/// lists; only the switch itself is deferred.
pub fn os_sched_lock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }
    if is_isr_context() {
        return Err(OsError::SchedLockIsr);
    }

    critical_section(|_cs| KERNEL.try_sched_lock())
}

/// Unlock the scheduler; the outermost unlock yields so preemption
/// deferred during the lock happens immediately.
pub fn os_sched_unlock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }
    if is_isr_context() {
        return Err(OsError::SchedLockIsr);
    }

    let remaining = critical_section(|_cs| KERNEL.try_sched_unlock())?;
    if remaining == 0 {
        crate::sched::os_task_yield();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_lock;

    #[test]
    fn init_resets_flags_and_counters() {
        let _guard = test_lock::lock();
        os_init().unwrap();

        assert!(!KERNEL.is_running());
        assert_eq!(KERNEL.tick_get(), 0);
        assert_eq!(KERNEL.task_count(), 0);
        assert_eq!(KERNEL.overflow_count(), 0);
        assert!(os_task_current().is_none());
        unsafe {
            let sched = SCHED.get_unchecked();
            assert_eq!(sched.next_unblock, TICK_MAX);
            assert!(sched.prio_mask.is_empty());
        }
        critical::reset_critical_nesting();
    }

    #[test]
    fn sched_lock_requires_running_kernel() {
        let _guard = test_lock::lock();
        os_init().unwrap();
        critical::reset_critical_nesting();

        assert_eq!(os_sched_lock(), Err(OsError::OsNotRunning));
        assert_eq!(os_sched_unlock(), Err(OsError::OsNotRunning));
    }

    #[test]
    fn sched_lock_nests_and_balances() {
        let _guard = test_lock::lock();
        os_init().unwrap();
        critical::reset_critical_nesting();

        static mut TCB: OsTcb = OsTcb::new();
        static mut STK: [OsStkElement; 64] = [0; 64];
        unsafe {
            task::os_task_create_raw(
                &raw mut TCB,
                "t",
                crate::task::tests_entry,
                ptr::null_mut(),
                1,
                (&raw mut STK).cast(),
                64,
            )
            .unwrap();
        }
        os_start().unwrap();

        os_sched_lock().unwrap();
        os_sched_lock().unwrap();
        assert_eq!(KERNEL.sched_lock_nesting(), 2);
        os_sched_unlock().unwrap();
        assert_eq!(KERNEL.sched_lock_nesting(), 1);
        os_sched_unlock().unwrap();
        assert_eq!(KERNEL.sched_lock_nesting(), 0);
        assert_eq!(os_sched_unlock(), Err(OsError::SchedNotLocked));

        KERNEL.set_running(false);
    }
}
