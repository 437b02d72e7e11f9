// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Module C: the allocator facade. `allocate`/`resize`/`free` mirror every
//! operation into the registry (spec §4.C).
//!
//! Both the payload and its [`AllocRecord`] come from the platform
//! allocator (`libc::malloc`/`realloc`/`free`), not Rust's `GlobalAlloc` —
//! this matches the C idiom spec §4.B calls out: `free`/`resize` take a
//! bare pointer with no companion `Layout`, so there is nowhere to recover
//! a `Layout` from if we went through `std::alloc` instead.

use crate::gc::CollectorState;
use crate::registry::{self, AllocRecord};
use std::mem;
use std::ptr;

/// The null sentinel spec §7 uses for every facade failure mode.
pub const NULL: *mut u8 = ptr::null_mut();

/// Requests `size` bytes from the platform allocator; on success allocates
/// and tags a record, pushes it at the registry head, and bumps the
/// allocation count. If the threshold trigger fires, runs a collection
/// from this call site (spec §4.C).
///
/// Returns [`NULL`] if the payload or the record allocation fails; if the
/// record allocation fails after the payload succeeded, the payload is
/// freed first so no partial registration survives (spec §7).
pub fn allocate(state: &mut CollectorState, size: usize, zero_init: bool) -> *mut u8 {
    unsafe {
        let payload = libc::malloc(size.max(1)) as *mut u8;
        if payload.is_null() {
            return NULL;
        }
        if zero_init {
            ptr::write_bytes(payload, 0, size);
        }

        let record = libc::malloc(mem::size_of::<AllocRecord>()) as *mut AllocRecord;
        if record.is_null() {
            libc::free(payload as *mut libc::c_void);
            return NULL;
        }
        ptr::write(record, AllocRecord::new(payload, size));

        let inner = state.inner_mut();
        registry::push_front(&mut inner.head, record);
        inner.allocations += 1;

        log::trace!("conservgc: allocate({size}, zero_init={zero_init}) -> {payload:p}");

        if inner.threshold != 0 && inner.allocations % inner.threshold == 0 {
            // Auto-triggered collection runs from *this* frame, not the
            // mutator's `collect!` call site — it still gets the current
            // (library-internal) registers and the full stack, just not
            // the mutator frame's own registers directly; anything held
            // there is still found via the stack scan if it was spilled,
            // which is the conservative-scan contract spec §4.D already
            // accepts.
            crate::collect!(state);
        }

        payload
    }
}

/// `resize(null, n) == allocate(n, false)`; `resize(p, 0) == { free(p);
/// null }` (spec §4.C, P4). Otherwise relocates in place via the platform
/// allocator and updates the record's stored base.
///
/// Per spec §9's preserved open question, only `ptr` is updated on a
/// successful resize — `size` is left stale at its pre-resize value. This
/// mirrors an ambiguity in the source design rather than a considered
/// choice; callers that need the record's `size` to reflect reality after
/// a grow/shrink should not rely on it.
pub fn resize(state: &mut CollectorState, ptr_in: *mut u8, new_size: usize) -> *mut u8 {
    if ptr_in.is_null() {
        return allocate(state, new_size, false);
    }
    if new_size == 0 {
        free(state, ptr_in);
        return NULL;
    }

    unsafe {
        let inner = state.inner_mut();
        let record = registry::find_by_base(inner.head, ptr_in);
        if record.is_null() {
            return NULL;
        }

        let new_payload = libc::realloc(ptr_in as *mut libc::c_void, new_size) as *mut u8;
        if new_payload.is_null() {
            return NULL;
        }

        (*record).ptr = new_payload;
        // `size` intentionally left stale; see doc comment above.
        new_payload
    }
}

/// Null is a no-op. Otherwise unlinks by exact-base match and frees both
/// the payload and its record (spec §4.C). If somehow more than one record
/// shared a base — forbidden by spec §3 I2, but not impossible to construct
/// by misuse — every match is removed.
pub fn free(state: &mut CollectorState, ptr_in: *mut u8) {
    if ptr_in.is_null() {
        return;
    }

    unsafe {
        let inner = state.inner_mut();
        loop {
            let record = registry::find_by_base(inner.head, ptr_in);
            if record.is_null() {
                break;
            }
            registry::unlink(&mut inner.head, record);
            libc::free((*record).ptr as *mut libc::c_void);
            libc::free(record as *mut libc::c_void);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc;
    use crate::ScanPolicy;

    #[test]
    fn allocate_then_free_leaves_no_record() {
        let mut state = gc::init(ScanPolicy::empty()).unwrap();
        let ptr = allocate(&mut state, 32, true);
        assert!(!ptr.is_null());
        assert_eq!(state.inner().allocations, 1);

        free(&mut state, ptr);
        assert!(state.inner().head.is_null());

        gc::destroy(state);
    }

    #[test]
    fn resize_null_delegates_to_allocate() {
        let mut state = gc::init(ScanPolicy::empty()).unwrap();
        let ptr = resize(&mut state, ptr::null_mut(), 16);
        assert!(!ptr.is_null());
        assert_eq!(state.inner().allocations, 1);
        gc::destroy(state);
    }

    #[test]
    fn resize_to_zero_frees_and_returns_null() {
        let mut state = gc::init(ScanPolicy::empty()).unwrap();
        let ptr = allocate(&mut state, 16, false);
        let result = resize(&mut state, ptr, 0);
        assert!(result.is_null());
        assert!(state.inner().head.is_null());
        gc::destroy(state);
    }

    #[test]
    fn resize_of_untracked_pointer_returns_null() {
        let mut state = gc::init(ScanPolicy::empty()).unwrap();
        let mut local = 0u64;
        let bogus = &mut local as *mut u64 as *mut u8;
        assert!(resize(&mut state, bogus, 8).is_null());
        gc::destroy(state);
    }

    #[test]
    fn free_of_untracked_pointer_is_a_no_op() {
        let mut state = gc::init(ScanPolicy::empty()).unwrap();
        let mut local = 0u64;
        let bogus = &mut local as *mut u64 as *mut u8;
        free(&mut state, bogus); // must not panic or corrupt the registry
        assert!(state.inner().head.is_null());
        gc::destroy(state);
    }

    #[test]
    fn resize_updates_ptr_but_leaves_size_stale() {
        let mut state = gc::init(ScanPolicy::empty()).unwrap();
        let ptr = allocate(&mut state, 8, false);
        let moved = resize(&mut state, ptr, 4096);
        assert!(!moved.is_null());

        unsafe {
            let record = registry::find_by_base(state.inner().head, moved);
            assert!(!record.is_null());
            assert_eq!((*record).size, 8, "size must stay stale per spec §9");
        }

        free(&mut state, moved);
        gc::destroy(state);
    }
}
