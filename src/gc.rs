// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Module E: sweep and lifecycle. Owns [`CollectorState`], the collection
//! trigger policy, and the `init`/`destroy`/`collect` entry points (spec
//! §3, §4.E).

use crate::error::{GcError, Result};
use crate::registry::{self, AllocRecord};
use crate::{platform, Region, ScanPolicy};
use parking_lot::Mutex;
use std::mem;
use std::ptr;

/// Fixed, compile-time ASCII tag for the collector state itself (spec §3,
/// §6). Distinct from [`registry::RECORD_TAG`] so a heap scan that happens
/// to land on the state's own backing allocation doesn't mistake it for a
/// tracked payload.
pub const STATE_TAG: [u8; 16] = *b"CONSERVGCSTATE01";
static_assertions::const_assert_eq!(STATE_TAG.len(), 16);

/// Default collection-trigger threshold (spec §4.E: `init` "sets ...
/// threshold=128").
pub const DEFAULT_THRESHOLD: u64 = 128;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum CollectorPhase {
    Ready,
    RootScanning,
    Marking,
    Sweeping,
}

/// Which half of a collection cycle actually runs. Defaults to both; tests
/// use this the way the teacher's own `DebugFlags` does, to observe one
/// phase's effect in isolation (spec §8 boundary scenarios 7/8).
#[derive(Debug, Clone, Copy)]
pub struct CollectPhases {
    pub mark: bool,
    pub sweep: bool,
}

impl Default for CollectPhases {
    fn default() -> Self {
        CollectPhases { mark: true, sweep: true }
    }
}

impl CollectPhases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(mut self, enabled: bool) -> Self {
        self.mark = enabled;
        self
    }

    pub fn sweep(mut self, enabled: bool) -> Self {
        self.sweep = enabled;
        self
    }
}

/// Backing storage for [`CollectorState`]. Allocated through the platform
/// allocator (not Rust's global allocator) so that, like an
/// [`AllocRecord`], it can legitimately live inside a scanned heap region
/// and still be recognised and skipped by its tag (spec §3 I2, §4.D step 1).
#[repr(C)]
pub(crate) struct CollectorStateInner {
    pub(crate) tag: [u8; 16],
    pub(crate) stack_base: Option<usize>,
    pub(crate) data: Option<Region>,
    pub(crate) bss: Option<Region>,
    /// Mach-O's separate `__common` region. Populated on Apple targets but
    /// deliberately not scanned — spec §9 leaves "extend the bss scan to
    /// cover it, or drop the field" undecided; see DESIGN.md open question 3.
    pub(crate) common: Option<Region>,
    pub(crate) head: *mut AllocRecord,
    pub(crate) allocations: u64,
    pub(crate) collections: u64,
    pub(crate) threshold: u64,
    pub(crate) flags: ScanPolicy,
    pub(crate) phases: CollectPhases,
    pub(crate) phase: Mutex<CollectorPhase>,
}

/// Handle to a collector instance, created by [`init`] and destroyed by
/// [`destroy`]. Passed explicitly to every operation (spec §3, §6) rather
/// than living behind a global — unlike a garbage-collected-smart-pointer
/// design, this crate supports one live instance per handle, not an
/// ambient singleton.
pub struct CollectorState {
    pub(crate) inner: *mut CollectorStateInner,
}

/// Creates a new collector state: captures the stack base and static
/// section ranges once, and sets `head = null`, `allocations = 0`,
/// `threshold = 128`, `flags = flags` (spec §4.E).
pub fn init(flags: ScanPolicy) -> Result<CollectorState> {
    unsafe {
        let raw = libc::malloc(mem::size_of::<CollectorStateInner>()) as *mut CollectorStateInner;
        if raw.is_null() {
            return Err(GcError::StateAllocationFailed);
        }

        let (data, bss) = platform::static_ranges();
        ptr::write(
            raw,
            CollectorStateInner {
                tag: STATE_TAG,
                stack_base: platform::stack_base(),
                data,
                bss,
                common: None,
                head: ptr::null_mut(),
                allocations: 0,
                collections: 0,
                threshold: DEFAULT_THRESHOLD,
                flags,
                phases: CollectPhases::default(),
                phase: Mutex::new(CollectorPhase::Ready),
            },
        );

        log::debug!(
            "conservgc: initialised (stack_base={:?}, data={:?}, bss={:?}, flags={:?})",
            (*raw).stack_base,
            (*raw).data,
            (*raw).bss,
            flags,
        );

        Ok(CollectorState { inner: raw })
    }
}

/// Frees every remaining tracked payload, then the state itself.
pub fn destroy(state: CollectorState) {
    unsafe {
        let inner = &mut *state.inner;
        let mut cur = inner.head;
        while !cur.is_null() {
            let next = (*cur).next;
            libc::free((*cur).ptr as *mut libc::c_void);
            libc::free(cur as *mut libc::c_void);
            cur = next;
        }
        inner.head = ptr::null_mut();
        libc::free(state.inner as *mut libc::c_void);
    }
    // `CollectorState` carries no `Drop` impl (mirroring the C idiom of
    // explicit init/destroy pairs); this `forget` just documents that its
    // backing storage is already gone and nothing should run again on it.
    mem::forget(state);
}

impl CollectorState {
    pub(crate) fn inner(&self) -> &CollectorStateInner {
        unsafe { &*self.inner }
    }

    pub(crate) fn inner_mut(&mut self) -> &mut CollectorStateInner {
        unsafe { &mut *self.inner }
    }

    /// Overrides which phases `collect!` runs; see [`CollectPhases`].
    pub fn set_phases(&mut self, phases: CollectPhases) {
        self.inner_mut().phases = phases;
    }

    /// Overrides the auto-collection threshold (0 disables the trigger).
    pub fn set_threshold(&mut self, threshold: u64) {
        self.inner_mut().threshold = threshold;
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        self.inner().flags
    }

    pub fn set_scan_policy(&mut self, flags: ScanPolicy) {
        self.inner_mut().flags = flags;
    }

    pub fn allocation_count(&self) -> u64 {
        self.inner().allocations
    }

    /// How many completed collection cycles have run on this state (a
    /// re-entrant `collect!` that bailed out on the phase guard doesn't
    /// count). A diagnostic hook, not part of spec's sentinel-shaped
    /// facade — used by tests to observe that a collection occurred
    /// without relying on the reclamation of a pointer that is still
    /// demonstrably live.
    pub fn collection_count(&self) -> u64 {
        self.inner().collections
    }
}

/// The internal collect routine invoked by the [`crate::collect`] macro
/// after it has captured registers at the call site. Not part of the
/// public surface: calling it directly would scan whatever register
/// snapshot happened to be captured by someone else's `collect!` expansion.
#[doc(hidden)]
pub fn collect_impl(state: &mut CollectorState, stack_top: usize) {
    let inner = state.inner_mut();

    {
        let mut phase = inner.phase.lock();
        match *phase {
            CollectorPhase::Ready => *phase = CollectorPhase::RootScanning,
            // Re-entrant collect (spec §5: "`collect` must not be invoked
            // from an allocation callback that is itself invoked by
            // `collect`"). There are none in this design, but the guard
            // costs nothing and documents the constraint.
            _ => return,
        }
    }

    if inner.phases.mark {
        *inner.phase.lock() = CollectorPhase::Marking;
        unsafe { crate::mark::mark_roots(inner, stack_top) };
    }

    if inner.phases.sweep {
        *inner.phase.lock() = CollectorPhase::Sweeping;
        sweep(inner);
    }

    inner.collections += 1;
    *inner.phase.lock() = CollectorPhase::Ready;
}

/// Frees every record with `reachable == false`; records that survived are
/// left untouched (spec §4.E — the `reachable` flag is reset at the *next*
/// cycle's start, not here).
pub(crate) fn sweep(inner: &mut CollectorStateInner) {
    let mut cur = inner.head;
    let mut freed = 0u64;
    let mut kept = 0u64;

    while !cur.is_null() {
        let next = unsafe { (*cur).next };
        let reachable = unsafe { (*cur).reachable };
        if !reachable {
            unsafe {
                registry::unlink(&mut inner.head, cur);
                libc::free((*cur).ptr as *mut libc::c_void);
                libc::free(cur as *mut libc::c_void);
            }
            freed += 1;
        } else {
            kept += 1;
        }
        cur = next;
    }

    log::debug!("conservgc: sweep complete (freed={freed}, live={kept})");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScanPolicy;

    #[test]
    fn init_sets_defaults() {
        let state = init(ScanPolicy::EVERYTHING).expect("init should succeed");
        assert_eq!(state.inner().threshold, DEFAULT_THRESHOLD);
        assert_eq!(state.inner().allocations, 0);
        assert_eq!(state.inner().collections, 0);
        assert!(state.inner().head.is_null());
        assert_eq!(&state.inner().tag, &STATE_TAG);
        destroy(state);
    }

    #[test]
    fn state_tag_and_record_tag_are_distinct() {
        assert_ne!(STATE_TAG, registry::RECORD_TAG);
    }

    #[test]
    fn collect_on_empty_state_is_a_no_op() {
        let mut state = init(ScanPolicy::EVERYTHING_EXCEPT_HEAPS).unwrap();
        collect_impl(&mut state, crate::platform::registers::current_stack_top());
        assert_eq!(state.inner().allocations, 0);
        assert_eq!(state.inner().collections, 1);
        destroy(state);
    }
}
