//! Compile-time configuration
//!
//! These constants control the behavior and resource limits of the
//! kernel. Tick width is the one type-level knob and lives behind the
//! `tick-16bit` cargo feature instead.

use crate::types::OsPrio;

/// Number of task priority levels. Priority 0 is reserved for the idle
/// task; higher numbers preempt lower ones.
pub const CFG_MAX_PRIORITIES: usize = 8;

// The ready bitmap is a single 32-bit word.
const _: () = assert!(CFG_MAX_PRIORITIES <= 32);

/// Idle task priority
pub const CFG_PRIO_IDLE: OsPrio = 0;

/// Task name buffer length in bytes, terminator included
pub const CFG_MAX_TASK_NAME_LEN: usize = 16;

/// BASEPRI value loaded while in a kernel critical section. Interrupts
/// whose priority number is >= this value are masked and may call the
/// ISR-safe kernel APIs; interrupts above it stay live but must not
/// touch the kernel.
pub const CFG_MAX_SYSCALL_INT_PRIO: u32 = 191;

/// Tick-driven preemption (0 would leave only voluntary switches)
pub const CFG_USE_PREEMPTION: bool = true;

/// Round-robin among equal-priority tasks on each tick
pub const CFG_USE_TIME_SLICING: bool = true;

/// Use count-leading-zeros for ready-priority selection instead of a
/// downward scan
pub const CFG_USE_PORT_OPTIMISED_TASK_SELECTION: bool = true;

/// Idle task stack depth in words
pub const CFG_MINIMAL_STACK_SIZE: usize = 128;

/// Smallest accepted task stack, in words
pub const CFG_STK_SIZE_MIN: usize = 32;

/// Core clock feeding the system timer
pub const CFG_CPU_CLOCK_HZ: u32 = 12_000_000;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;
