// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, or the UPL-1.0 license
// <http://opensource.org/licenses/UPL> at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A conservative, stop-the-world, mark-and-sweep garbage collector
//! embedded as a library.
//!
//! The host allocates through [`allocate`]/[`resize`]/[`free`] instead of
//! the platform allocator; [`collect!`] scans CPU registers, the calling
//! thread's stack, static data, and (optionally) other heap regions for
//! bit patterns that happen to equal the addresses of tracked allocations,
//! and frees anything unreferenced.
//!
//! This is a single-threaded, stop-the-world design: no generational,
//! incremental, concurrent, or moving collection; no finalisers or weak
//! references; no cross-thread root scanning. See the crate's `SPEC_FULL.md`
//! for the full set of design constraints this implementation honours.
//!
//! ```
//! use conservgc::{ScanPolicy, collect};
//!
//! let _ = env_logger::try_init();
//!
//! let mut gc = conservgc::init(ScanPolicy::EVERYTHING_EXCEPT_HEAPS).unwrap();
//! let ptr = conservgc::allocate(&mut gc, 8, true);
//! assert!(!ptr.is_null());
//! collect!(&mut gc);
//! conservgc::destroy(gc);
//! ```

mod alloc_facade;
mod diagnostics;
mod error;
mod gc;
mod mark;
mod platform;
mod registry;

pub use alloc_facade::{allocate, free, resize};
pub use diagnostics::print_state;
pub use error::{GcError, Result};
pub use gc::{destroy, init, CollectPhases, CollectorState};

use bitflags::bitflags;

/// An address range, `[start, end)` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

bitflags! {
    /// Which root regions a collection cycle scans (spec §6 — stable wire
    /// values, do not renumber).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanPolicy: u32 {
        const STACK     = 0x01;
        const HEAPS     = 0x02;
        const DATA      = 0x04;
        const BSS       = 0x08;
        const REGISTERS = 0x10;

        const ALL_GLOBALS = Self::DATA.bits() | Self::BSS.bits();
        const ALL_MEMORY = Self::STACK.bits() | Self::HEAPS.bits() | Self::ALL_GLOBALS.bits();
        const EVERYTHING = Self::ALL_MEMORY.bits() | Self::REGISTERS.bits();
        const EVERYTHING_EXCEPT_HEAPS = Self::EVERYTHING.bits() & !Self::HEAPS.bits();
    }
}

/// Runs a collection cycle on `state`.
///
/// This has to be a macro, not a function: spec §4.A requires the register
/// snapshot to be captured at the *literal call site*, because any
/// intervening function call is free to perturb argument/caller-saved
/// registers before a callee gets a chance to read them. Expanding inline
/// is the only way to guarantee the snapshot reflects the caller's own
/// live registers.
#[macro_export]
macro_rules! collect {
    ($state:expr) => {{
        let __conservgc_stack_top = $crate::__private::current_stack_top();
        unsafe { $crate::__private::capture_registers() };
        $crate::__private::collect_impl($state, __conservgc_stack_top)
    }};
}

/// Implementation details reached into by the [`collect!`] macro
/// expansion. Not part of the public API surface despite being
/// unavoidably `pub` (macro hygiene requires an absolute path the
/// expansion site can always resolve).
#[doc(hidden)]
pub mod __private {
    pub use crate::gc::collect_impl;
    pub use crate::platform::registers::{capture_registers, current_stack_top};
}

/// Test-only introspection, gated behind the `test-support` feature so the
/// public surface stays exactly spec §6's facade in a normal build. The
/// `gc_tests` integration binaries enable this feature via
/// `required-features` to check reachability without reaching into crate
/// internals from outside the crate.
#[cfg(feature = "test-support")]
pub mod testing {
    use crate::gc::CollectorState;
    use crate::registry;

    /// Whether `ptr` is currently tracked by `state` (i.e. survives a sweep
    /// because it was found reachable, or simply hasn't been collected
    /// yet). Exact-base match only, same as the facade itself.
    pub fn is_tracked(state: &CollectorState, ptr: *mut u8) -> bool {
        !unsafe { registry::find_by_base(state.inner().head, ptr) }.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_policy_unions_match_spec_bit_values() {
        assert_eq!(ScanPolicy::ALL_GLOBALS.bits(), 0x04 | 0x08);
        assert_eq!(ScanPolicy::ALL_MEMORY.bits(), 0x01 | 0x02 | 0x04 | 0x08);
        assert_eq!(ScanPolicy::EVERYTHING.bits(), 0x1f);
        assert_eq!(ScanPolicy::EVERYTHING_EXCEPT_HEAPS.bits(), 0x1f & !0x02);
    }

    #[test]
    fn allocate_resize_free_roundtrip() {
        let mut gc = init(ScanPolicy::empty()).unwrap();
        let ptr = allocate(&mut gc, 16, true);
        assert!(!ptr.is_null());

        let ptr = resize(&mut gc, ptr, 64);
        assert!(!ptr.is_null());

        free(&mut gc, ptr);
        assert_eq!(gc.allocation_count(), 1);

        destroy(gc);
    }

    #[test]
    fn collect_with_no_roots_sweeps_everything() {
        let mut gc = init(ScanPolicy::EVERYTHING_EXCEPT_HEAPS).unwrap();
        let _ = allocate(&mut gc, 32, false);
        let _ = allocate(&mut gc, 32, false);

        collect!(&mut gc);

        print_state(&gc);
        destroy(gc);
    }
}
