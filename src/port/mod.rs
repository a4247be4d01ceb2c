//! Port layer - CPU-specific implementations
//!
//! The initial stack-frame layout is plain memory writes and is shared
//! with host builds so it stays testable; everything that needs the
//! Cortex-M3 itself (exception handlers, BASEPRI, SysTick) lives in
//! [`cortex_m3`] with a no-op stub standing in on other targets.

use crate::task::OsTaskFn;
use crate::types::OsStkElement;

#[cfg(target_arch = "arm")]
pub mod cortex_m3;

#[cfg(target_arch = "arm")]
pub use cortex_m3::*;

#[cfg(not(target_arch = "arm"))]
pub mod stub;

#[cfg(not(target_arch = "arm"))]
pub use stub::*;

/// Program-status word for a fresh task: only the Thumb bit set
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Halfword-aligns the entry address; the Thumb state comes from xPSR
/// when the frame is popped.
const START_ADDRESS_MASK: u32 = !1;

/// Registers a suspended task holds on its stack, low address first.
/// The handler prologue/epilogue moves `r4..r11`; exception entry and
/// return move the rest in hardware.
#[repr(C)]
#[allow(dead_code)] // written as a block, read back by the exception hardware
struct InitialStackFrame {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

const FRAME_WORDS: usize = core::mem::size_of::<InitialStackFrame>() / 4;

/// Where a task ends up if its entry function ever returns: parked
/// forever with interrupts masked.
pub(crate) fn os_task_exit_error() -> ! {
    #[cfg(target_arch = "arm")]
    cortex_m::interrupt::disable();
    loop {
        core::hint::spin_loop();
    }
}

/// Lay out the initial exception frame on a fresh task stack.
///
/// `stk_top` is the 8-byte-aligned top computed by task creation. The
/// frame sits in the sixteen words below it (the top word itself stays
/// free; the hardware re-biases on the first real exception). Returns
/// the task's starting stack pointer, i.e. the address of the saved R4.
///
/// # Safety
/// `stk_top` must point at least [`FRAME_WORDS`] words into a valid,
/// exclusively owned stack buffer.
pub unsafe fn os_task_stk_init(
    stk_top: *mut OsStkElement,
    entry: OsTaskFn,
    arg: *mut (),
) -> *mut OsStkElement {
    unsafe {
        let frame = stk_top.sub(FRAME_WORDS) as *mut InitialStackFrame;
        frame.write(InitialStackFrame {
            r4: 0,
            r5: 0,
            r6: 0,
            r7: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r0: arg as usize as u32,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: os_task_exit_error as *const () as usize as u32,
            pc: (entry as usize as u32) & START_ADDRESS_MASK,
            xpsr: INITIAL_XPSR,
        });
        frame as *mut OsStkElement
    }
}
