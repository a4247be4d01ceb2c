//! Core type definitions for the kernel
//!
//! These aliases give kernel primitives their own names so the rest of
//! the code reads in terms of ticks and priorities, not bare integers.

/// Task priority (0 = idle, higher number = more urgent)
pub type OsPrio = u8;

/// Tick counter type, 16 or 32 bits wide per configuration
#[cfg(feature = "tick-16bit")]
pub type OsTick = u16;
#[cfg(not(feature = "tick-16bit"))]
pub type OsTick = u32;

/// Atomic cell matching the configured tick width
#[cfg(feature = "tick-16bit")]
pub(crate) type OsTickAtomic = core::sync::atomic::AtomicU16;
#[cfg(not(feature = "tick-16bit"))]
pub(crate) type OsTickAtomic = core::sync::atomic::AtomicU32;

/// Largest representable tick value. Doubles as the sort key of every
/// list sentinel and as the "nothing to wake" marker.
pub const TICK_MAX: OsTick = OsTick::MAX;

/// Stack element type
pub type OsStkElement = u32;

/// Nesting counter
pub type OsNestingCtr = u8;
