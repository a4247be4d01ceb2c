//! Intrusive doubly-linked lists with a sentinel end marker and a
//! persistent traversal cursor
//!
//! Every scheduler queue (the per-priority ready lists and both delay
//! lists) is one of these. The hooks are embedded in the TCB, so moving
//! a task between queues is a pointer splice with no allocation and no
//! search. The cursor survives across calls; round-robin dispatch is
//! nothing more than walking it forward.
//!
//! The engine performs no interrupt masking of its own. Callers on
//! scheduler paths hold a critical section (or run in the context-switch
//! exception) around every operation.

use core::ptr::{self, NonNull};

use crate::task::OsTcb;
use crate::types::{OsTick, TICK_MAX};

/// A list hook embedded in a larger structure.
///
/// `value` orders the item in time-sorted lists, `owner` points back at
/// the enclosing TCB, and `container` names the list the item is linked
/// into (null while detached). Neighbor pointers are only meaningful
/// while linked.
#[repr(C)]
pub struct ListItem {
    value: OsTick,
    next: *mut ListItem,
    prev: *mut ListItem,
    owner: *mut OsTcb,
    container: *mut List,
}

impl ListItem {
    pub const fn new() -> Self {
        ListItem {
            value: 0,
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
            owner: ptr::null_mut(),
            container: ptr::null_mut(),
        }
    }

    /// Mark the item detached. Neighbors and sort key are populated by
    /// whichever insert links it later.
    #[inline]
    pub fn init(&mut self) {
        self.container = ptr::null_mut();
    }

    /// Sort key used by ordered insertion
    #[inline]
    pub fn value(&self) -> OsTick {
        self.value
    }

    #[inline]
    pub fn set_value(&mut self, value: OsTick) {
        self.value = value;
    }

    /// The enclosing TCB. Set once at item initialization; the list
    /// engine never writes it.
    #[inline]
    pub fn owner(&self) -> *mut OsTcb {
        self.owner
    }

    #[inline]
    pub fn set_owner(&mut self, owner: *mut OsTcb) {
        self.owner = owner;
    }

    /// Whether the item is currently linked into some list
    #[inline]
    pub fn is_linked(&self) -> bool {
        !self.container.is_null()
    }
}

impl Default for ListItem {
    fn default() -> Self {
        Self::new()
    }
}

/// An intrusive list: an item count, a traversal cursor and an embedded
/// sentinel whose sort key is [`TICK_MAX`], so ordered insertions can
/// never land behind it.
pub struct List {
    num_items: usize,
    /// Traversal cursor; rests on a live item or on the sentinel
    index: *mut ListItem,
    /// End marker; `next` of the sentinel is the head of the list
    end: ListItem,
}

impl List {
    pub const fn new() -> Self {
        List {
            num_items: 0,
            index: ptr::null_mut(),
            end: ListItem::new(),
        }
    }

    /// Wire the sentinel to itself and park the cursor on it.
    ///
    /// The list is self-referential from here on and must not move.
    /// Scheduler lists live in statics, which satisfies this; tests pin
    /// theirs on the stack.
    pub fn init(&mut self) {
        let end = &mut self.end as *mut ListItem;
        self.end.value = TICK_MAX;
        self.end.next = end;
        self.end.prev = end;
        self.index = end;
        self.num_items = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_items
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    /// First real item in sort order, or `None` when empty
    #[inline]
    pub fn head(&self) -> Option<NonNull<ListItem>> {
        if self.num_items == 0 {
            None
        } else {
            NonNull::new(self.end.next)
        }
    }

    /// Sort key of the head item. The list must not be empty.
    #[inline]
    pub fn head_value(&self) -> OsTick {
        debug_assert!(self.num_items != 0);
        unsafe { (*self.end.next).value }
    }

    /// Insert `item` immediately before the cursor.
    ///
    /// Relative to the cursor this is FIFO: the cursor's forward sweep
    /// reaches `item` after everything inserted before it. Round-robin
    /// selection leans on exactly that property.
    ///
    /// # Safety
    /// `item` must be valid, detached, and outlive its membership.
    pub unsafe fn insert_end(&mut self, item: NonNull<ListItem>) {
        let item_ptr = item.as_ptr();
        unsafe {
            debug_assert!(!(*item_ptr).is_linked());
            let index = self.index;
            (*item_ptr).next = index;
            (*item_ptr).prev = (*index).prev;
            (*(*index).prev).next = item_ptr;
            (*index).prev = item_ptr;
            (*item_ptr).container = self as *mut List;
        }
        self.num_items += 1;
    }

    /// Ordered insertion by ascending sort key. Among equal keys the new
    /// item goes after the ones already present, so wake order at the
    /// same tick is creation order.
    ///
    /// # Safety
    /// `item` must be valid, detached, and outlive its membership.
    pub unsafe fn insert(&mut self, item: NonNull<ListItem>) {
        let item_ptr = item.as_ptr();
        unsafe {
            debug_assert!(!(*item_ptr).is_linked());
            let value = (*item_ptr).value;
            let after = if value == TICK_MAX {
                // Maximum key goes straight to the back, just before
                // the sentinel.
                self.end.prev
            } else {
                let mut it = &mut self.end as *mut ListItem;
                while (*(*it).next).value <= value {
                    it = (*it).next;
                }
                it
            };
            (*item_ptr).next = (*after).next;
            (*item_ptr).prev = after;
            (*(*after).next).prev = item_ptr;
            (*after).next = item_ptr;
            (*item_ptr).container = self as *mut List;
        }
        self.num_items += 1;
    }

    /// Unlink `item` from whatever list holds it; returns how many items
    /// that list still has (the scheduler clears ready-mask bits when
    /// this hits zero).
    ///
    /// When the cursor sat on `item` it backs up to the predecessor, so
    /// the next traversal step lands on `item`'s old successor.
    ///
    /// # Safety
    /// `item` must currently be linked into a list.
    pub unsafe fn remove(item: NonNull<ListItem>) -> usize {
        let item_ptr = item.as_ptr();
        unsafe {
            let list = (*item_ptr).container;
            debug_assert!(!list.is_null());
            (*(*item_ptr).prev).next = (*item_ptr).next;
            (*(*item_ptr).next).prev = (*item_ptr).prev;
            if (*list).index == item_ptr {
                (*list).index = (*item_ptr).prev;
            }
            (*item_ptr).container = ptr::null_mut();
            (*list).num_items -= 1;
            (*list).num_items
        }
    }

    /// Advance the cursor one item, skipping the sentinel, and return
    /// the owner of the item it lands on.
    ///
    /// # Safety
    /// The list must not be empty.
    pub unsafe fn owner_of_next_entry(&mut self) -> *mut OsTcb {
        debug_assert!(self.num_items != 0);
        unsafe {
            self.index = (*self.index).next;
            if self.index == &mut self.end as *mut ListItem {
                self.index = (*self.index).next;
            }
            (*self.index).owner
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: lists are only touched under a critical section or inside the
// context-switch exception, never concurrently.
unsafe impl Send for List {}
unsafe impl Sync for List {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::OsTcb;
    use std::vec::Vec;

    fn make_items<const N: usize>(values: [OsTick; N]) -> [ListItem; N] {
        values.map(|v| {
            let mut item = ListItem::new();
            item.init();
            item.set_value(v);
            item
        })
    }

    /// Walk forward from the sentinel collecting sort keys.
    fn forward_values(list: &List) -> Vec<OsTick> {
        let mut out = Vec::new();
        unsafe {
            let end = &list.end as *const ListItem as *mut ListItem;
            let mut it = list.end.next;
            while it != end {
                out.push((*it).value);
                it = (*it).next;
            }
        }
        out
    }

    /// Walk backward from the sentinel collecting sort keys.
    fn backward_values(list: &List) -> Vec<OsTick> {
        let mut out = Vec::new();
        unsafe {
            let end = &list.end as *const ListItem as *mut ListItem;
            let mut it = list.end.prev;
            while it != end {
                out.push((*it).value);
                it = (*it).prev;
            }
        }
        out
    }

    #[test]
    fn empty_after_init() {
        let mut list = List::new();
        list.init();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(list.head().is_none());
        assert_eq!(list.end.value, TICK_MAX);
        // Sentinel points at itself both ways.
        let end = &mut list.end as *mut ListItem;
        assert_eq!(list.end.next, end);
        assert_eq!(list.end.prev, end);
    }

    #[test]
    fn count_matches_both_traversals() {
        let mut list = List::new();
        list.init();
        let mut items = make_items([7, 2, 9, 2, 5]);
        for item in items.iter_mut() {
            unsafe { list.insert(NonNull::from(item)) };
        }
        assert_eq!(list.len(), 5);
        assert_eq!(forward_values(&list).len(), 5);
        assert_eq!(backward_values(&list).len(), 5);

        // Remove the middle by key, re-check accounting both ways.
        let head = list.head().unwrap();
        let remaining = unsafe { List::remove(head) };
        assert_eq!(remaining, 4);
        assert_eq!(list.len(), 4);
        let fwd = forward_values(&list);
        let mut bwd = backward_values(&list);
        bwd.reverse();
        assert_eq!(fwd, bwd);
    }

    #[test]
    fn ordered_insert_is_stable_among_equal_keys() {
        let mut list = List::new();
        list.init();
        let mut items = make_items([3, 1, 4, 1, 5]);
        // Tag owners so the two 1-keyed items are distinguishable.
        let mut tcbs: [OsTcb; 5] = [
            OsTcb::new(),
            OsTcb::new(),
            OsTcb::new(),
            OsTcb::new(),
            OsTcb::new(),
        ];
        for (item, tcb) in items.iter_mut().zip(tcbs.iter_mut()) {
            item.set_owner(tcb as *mut OsTcb);
        }
        for item in items.iter_mut() {
            unsafe { list.insert(NonNull::from(item)) };
        }
        assert_eq!(forward_values(&list), [1, 1, 3, 4, 5]);

        // The earlier-inserted 1 (items[1]) comes before the later one
        // (items[3]).
        unsafe {
            let first = list.end.next;
            let second = (*first).next;
            assert_eq!((*first).owner, &mut tcbs[1] as *mut OsTcb);
            assert_eq!((*second).owner, &mut tcbs[3] as *mut OsTcb);
        }
    }

    #[test]
    fn max_key_goes_to_the_tail() {
        let mut list = List::new();
        list.init();
        let mut items = make_items([10, TICK_MAX, 20]);
        for item in items.iter_mut() {
            unsafe { list.insert(NonNull::from(item)) };
        }
        assert_eq!(forward_values(&list), [10, 20, TICK_MAX]);
        // The max-keyed item sits immediately before the sentinel.
        unsafe {
            assert_eq!(list.end.prev, &mut items[1] as *mut ListItem);
        }
    }

    #[test]
    fn cursor_cycles_in_insertion_order() {
        let mut list = List::new();
        list.init();
        let mut tcbs = [OsTcb::new(), OsTcb::new(), OsTcb::new()];
        let mut items = make_items([0, 0, 0]);
        for (item, tcb) in items.iter_mut().zip(tcbs.iter_mut()) {
            item.set_owner(tcb as *mut OsTcb);
            unsafe { list.insert_end(NonNull::from(item)) };
        }
        let a = &mut tcbs[0] as *mut OsTcb;
        let b = &mut tcbs[1] as *mut OsTcb;
        let c = &mut tcbs[2] as *mut OsTcb;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(unsafe { list.owner_of_next_entry() });
        }
        assert_eq!(seen, [a, b, c, a, b, c, a]);
    }

    #[test]
    fn removing_the_cursor_item_keeps_rotation_intact() {
        let mut list = List::new();
        list.init();
        let mut tcbs = [OsTcb::new(), OsTcb::new(), OsTcb::new()];
        let mut items = make_items([0, 0, 0]);
        for (item, tcb) in items.iter_mut().zip(tcbs.iter_mut()) {
            item.set_owner(tcb as *mut OsTcb);
            unsafe { list.insert_end(NonNull::from(item)) };
        }
        let b = &mut tcbs[1] as *mut OsTcb;
        let c = &mut tcbs[2] as *mut OsTcb;

        // Cursor lands on A, then remove A: next entry must be B.
        let first = unsafe { list.owner_of_next_entry() };
        assert_eq!(first, &mut tcbs[0] as *mut OsTcb);
        let remaining = unsafe { List::remove(NonNull::from(&mut items[0])) };
        assert_eq!(remaining, 2);
        assert!(!items[0].is_linked());
        assert_eq!(unsafe { list.owner_of_next_entry() }, b);
        assert_eq!(unsafe { list.owner_of_next_entry() }, c);
        assert_eq!(unsafe { list.owner_of_next_entry() }, b);
    }

    #[test]
    fn insert_end_is_fifo_relative_to_the_cursor() {
        let mut list = List::new();
        list.init();
        let mut tcbs = [OsTcb::new(), OsTcb::new()];
        let mut items = make_items([0, 0]);
        items[0].set_owner(&mut tcbs[0] as *mut OsTcb);
        unsafe { list.insert_end(NonNull::from(&mut items[0])) };

        // Cursor moves onto the first item, then a second item arrives:
        // it is queued behind the full rotation, i.e. visited after the
        // sentinel wrap.
        let first = unsafe { list.owner_of_next_entry() };
        assert_eq!(first, &mut tcbs[0] as *mut OsTcb);
        items[1].set_owner(&mut tcbs[1] as *mut OsTcb);
        unsafe { list.insert_end(NonNull::from(&mut items[1])) };
        assert_eq!(
            unsafe { list.owner_of_next_entry() },
            &mut tcbs[1] as *mut OsTcb
        );
        assert_eq!(
            unsafe { list.owner_of_next_entry() },
            &mut tcbs[0] as *mut OsTcb
        );
    }
}
