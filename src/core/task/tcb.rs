//! Task Control Block (TCB) definition

use core::ptr;

use crate::config::CFG_MAX_TASK_NAME_LEN;
use crate::list::ListItem;
use crate::types::{OsPrio, OsStkElement};

/// Task Control Block
///
/// `stk_ptr` MUST stay the first field: the context-switch and launch
/// exception handlers reach the saved stack top by dereferencing the
/// TCB pointer itself.
#[repr(C)]
pub struct OsTcb {
    /// Current top of stack, written by the exception handlers
    pub stk_ptr: *mut OsStkElement,

    /// Hook into the state queues: exactly one of a ready list or a
    /// delay list while the scheduler runs
    pub state_item: ListItem,
    /// Hook reserved for event queues (IPC layers)
    pub event_item: ListItem,

    /// Task priority; fixed after creation
    pub prio: OsPrio,

    /// Base of the caller-provided stack; immutable after init
    pub stk_base: *mut OsStkElement,

    /// Task name, NUL-terminated
    pub name: [u8; CFG_MAX_TASK_NAME_LEN],
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: ptr::null_mut(),
            state_item: ListItem::new(),
            event_item: ListItem::new(),
            prio: 0,
            stk_base: ptr::null_mut(),
            name: [0; CFG_MAX_TASK_NAME_LEN],
        }
    }

    /// Reset every field to its initial value
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Task name as a string slice, cut at the terminator
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Copy `name` into the fixed buffer, truncating to leave room for
    /// the terminator.
    pub(crate) fn set_name(&mut self, name: &str) {
        let len = name.len().min(CFG_MAX_TASK_NAME_LEN - 1);
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.name[len] = 0;
        self.name[CFG_MAX_TASK_NAME_LEN - 1] = 0;
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
