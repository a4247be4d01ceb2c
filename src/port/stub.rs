//! Host stand-in for the port layer
//!
//! Keeps the kernel logic drivable from `cargo test` on the build
//! machine: masking is a no-op, pending a switch does nothing (tests
//! call the selection routine directly), and "starting" the scheduler
//! just falls through so tests regain control.

pub fn os_cpu_systick_init(_cnts: u32) {}

pub fn raise_basepri() {}

pub fn raise_basepri_from_isr() -> u32 {
    0
}

pub fn set_basepri(_value: u32) {}

pub fn os_ctx_sw() {}

/// # Safety
/// Trivially safe on the host; the signature mirrors the real port.
pub unsafe fn os_port_start_scheduler() {
    crate::critical::reset_critical_nesting();
}
