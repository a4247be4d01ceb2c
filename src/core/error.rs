//! Error types for the kernel
//!
//! Uses Rust's Result pattern instead of C-style status codes. The core
//! has a deliberately small recoverable surface; everything else goes
//! through the assertion policy in [`crate::critical`].

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsError {
    // ============ Task creation ============
    /// Null or invalid TCB buffer
    TcbInvalid,
    /// Null or invalid stack buffer
    StkInvalid,
    /// Stack below the configured minimum depth
    StkSizeInvalid,
    /// Cannot create a task from ISR context
    TaskCreateIsr,

    // ============ Kernel state ============
    /// Scheduler is already running
    OsRunning,
    /// Scheduler is not running
    OsNotRunning,

    // ============ Time ============
    /// Cannot delay from ISR context
    TimeDlyIsr,

    // ============ Scheduler lock ============
    /// Operation refused while the scheduler is locked
    SchedLocked,
    /// Unlock without a matching lock
    SchedNotLocked,
    /// Scheduler lock taken or released from ISR context
    SchedLockIsr,
    /// Lock nesting counter would overflow
    LockNestingOvf,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;
