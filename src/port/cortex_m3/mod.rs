//! Cortex-M3 port implementation
//!
//! Context switching rides the architected exception pair: `SVCall`
//! launches the first task, `PendSV` performs every switch after that.
//! Both kernel-entry exceptions and the tick run at the lowest
//! priority, so device interrupts always win and the switch tail-chains
//! in after they drain. Interrupt masking uses BASEPRI throughout, so
//! interrupts more urgent than the syscall ceiling are never blocked.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{
    CFG_CPU_CLOCK_HZ, CFG_MAX_SYSCALL_INT_PRIO, CFG_TICK_RATE_HZ, CFG_USE_PREEMPTION,
};
use crate::kernel::KERNEL;

/// Lowest system-handler priority: PendSV and SysTick must never
/// preempt anything.
const LOWEST_EXCEPTION_PRIO: u8 = 0xFF;

/// Initialize SysTick to fire at the configured tick rate
///
/// # Arguments
/// * `cnts` - core-clock cycles per tick
pub fn os_cpu_systick_init(cnts: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(cnts - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Raise BASEPRI to the syscall ceiling. Barriers flush the pipeline so
/// nothing after this runs under the old mask.
#[inline(always)]
pub fn raise_basepri() {
    unsafe {
        asm!(
            "msr basepri, {0}",
            "dsb",
            "isb",
            in(reg) CFG_MAX_SYSCALL_INT_PRIO,
            options(nostack, preserves_flags),
        );
    }
}

/// Raise BASEPRI and hand back the previous value for the ISR-safe
/// critical-section pairing.
#[inline(always)]
pub fn raise_basepri_from_isr() -> u32 {
    let prior: u32;
    unsafe {
        asm!(
            "mrs {0}, basepri",
            "msr basepri, {1}",
            "dsb",
            "isb",
            out(reg) prior,
            in(reg) CFG_MAX_SYSCALL_INT_PRIO,
            options(nostack, preserves_flags),
        );
    }
    prior
}

/// Write BASEPRI directly (0 unmasks everything)
#[inline(always)]
pub fn set_basepri(value: u32) {
    unsafe {
        asm!(
            "msr basepri, {0}",
            in(reg) value,
            options(nostack, preserves_flags),
        );
    }
}

/// Pend a context switch; it runs once every more urgent interrupt has
/// drained.
#[inline(always)]
pub fn os_ctx_sw() {
    cortex_m::peripheral::SCB::set_pendsv();
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Configure exception priorities, start the tick, and launch the
/// first task. Never returns.
///
/// # Safety
/// Call exactly once, from thread mode, with `CURRENT_TCB` pointing at
/// a fully initialized task.
pub unsafe fn os_port_start_scheduler() {
    unsafe {
        let mut p = cortex_m::Peripherals::steal();

        // Kernel-entry exceptions at the bottom of the pile; SVCall
        // stays at the top so the one launch call fires even while
        // BASEPRI is masking.
        p.SCB.set_priority(SystemHandler::PendSV, LOWEST_EXCEPTION_PRIO);
        p.SCB.set_priority(SystemHandler::SysTick, LOWEST_EXCEPTION_PRIO);
        p.SCB.set_priority(SystemHandler::SVCall, 0);

        os_cpu_systick_init(CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ);

        // Critical sections count for real from here on.
        crate::critical::reset_critical_nesting();

        os_start_first_task();
    }
}

/// Reload MSP from the vector table and trap into the launch exception.
///
/// Kernel bookkeeping ran on the reset stack; handing MSP back its
/// boot value reclaims all of it before the first task starts.
unsafe fn os_start_first_task() -> ! {
    unsafe {
        asm!(
            // VTOR -> vector table -> word 0: the boot MSP value.
            "ldr r0, =0xE000ED08",
            "ldr r0, [r0]",
            "ldr r0, [r0]",
            "msr msp, r0",
            "cpsie i",
            "cpsie f",
            "dsb",
            "isb",
            "svc 0",
            options(noreturn),
        )
    }
}

/// Launch exception: restore the chosen task and drop into thread mode
/// on the process stack.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "ldr r3, ={current}",
        "ldr r1, [r3]",
        // First TCB field is the saved stack top.
        "ldr r0, [r1]",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "isb",
        // Unmask; pre-start critical sections left BASEPRI raised.
        "mov r0, #0",
        "msr basepri, r0",
        // Thread mode, process stack.
        "orr r14, #0xd",
        "bx r14",
        current = sym crate::kernel::CURRENT_TCB,
    );
}

/// Context-switch exception.
///
/// Hardware already stacked xPSR/PC/LR/R12/R3-R0 on the process stack.
/// This saves the other half, lets the scheduler move `CURRENT_TCB`
/// under the syscall mask, and unwinds the same way for the incoming
/// task.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "isb",
        "ldr r3, ={current}",
        "ldr r2, [r3]",
        "stmdb r0!, {{r4-r11}}",
        // Publish the outgoing stack top through the first TCB field.
        "str r0, [r2]",
        "stmdb sp!, {{r3, r14}}",
        "mov r0, #{mask}",
        "msr basepri, r0",
        "dsb",
        "isb",
        "bl {switch}",
        "mov r0, #0",
        "msr basepri, r0",
        "ldmia sp!, {{r3, r14}}",
        "ldr r1, [r3]",
        "ldr r0, [r1]",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "isb",
        "bx r14",
        current = sym crate::kernel::CURRENT_TCB,
        switch = sym crate::sched::os_task_switch_context,
        mask = const CFG_MAX_SYSCALL_INT_PRIO,
    );
}

/// Tick exception: advance kernel time under the ISR mask and pend a
/// switch when the tick asks for one.
#[no_mangle]
pub extern "C" fn SysTick() {
    let prior = raise_basepri_from_isr();
    if crate::time::os_tick_increment()
        && CFG_USE_PREEMPTION
        && KERNEL.sched_lock_nesting() == 0
    {
        os_ctx_sw();
    }
    set_basepri(prior);
}
